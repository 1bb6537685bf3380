use std::time::Duration;

use argh::FromArgs;
use mcstat::{legacy::LegacyVariant, Address, Bedrock, Java, Legacy, Query};

#[derive(FromArgs)]
/// Print the status of a Minecraft server.
struct Args {
    /// server address, optionally with a port
    #[argh(positional)]
    address: String,

    /// protocol to use: java, legacy-beta, legacy-1.4, legacy-1.6, query or bedrock
    #[argh(option, short = 'p', default = "String::from(\"java\")")]
    protocol: String,

    /// timeout in seconds
    #[argh(option, short = 't', default = "5")]
    timeout: u64,

    /// print the MOTD as HTML instead of ANSI
    #[argh(switch)]
    html: bool,
}

fn render(motd: &mcstat::Motd, html: bool) -> String {
    if html {
        motd.to_html()
    } else {
        motd.to_ansi()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Args = argh::from_env();
    let timeout = Duration::from_secs(args.timeout);
    let legacy = |variant| -> Result<Legacy, mcstat::Error> {
        Ok(Legacy {
            variant,
            ..Legacy::new(Address::parse(&args.address, mcstat::java::DEFAULT_PORT)?, timeout)
        })
    };

    match args.protocol.as_str() {
        "java" => {
            let address = Address::parse(&args.address, mcstat::java::DEFAULT_PORT)?;
            let status = mcstat::get_status(Java::new(address, timeout))?;
            println!("version: {} ({})", status.version.name, status.version.protocol);
            println!("description:\n{}", render(&status.motd, args.html));
            println!("players: {}/{}", status.players.online, status.players.max);
            for player in status.players.sample.unwrap_or_default() {
                println!("  {}", player.name);
            }
            if let Some(forge) = status.forge_data {
                println!("forge mods: {}", forge.mods.len());
            }
            println!("latency: {}ms", status.latency.as_millis());
        }
        "legacy-beta" | "legacy-1.4" | "legacy-1.6" => {
            let variant = match args.protocol.as_str() {
                "legacy-beta" => LegacyVariant::Beta,
                "legacy-1.4" => LegacyVariant::V1_4,
                _ => LegacyVariant::V1_6,
            };
            let status = mcstat::get_status(legacy(variant)?)?;
            if let Some(version) = status.version {
                println!("version: {} ({})", version.name, version.protocol);
            }
            println!("description:\n{}", render(&status.motd, args.html));
            println!("players: {}/{}", status.players.online, status.players.max);
            println!("latency: {}ms", status.latency.as_millis());
        }
        "query" => {
            let address = Address::parse(&args.address, mcstat::java::DEFAULT_PORT)?;
            let status = Query::new(address, timeout).full_stat()?;
            println!("software: {}", status.software.brand);
            println!("description:\n{}", render(&status.motd, args.html));
            println!("map: {}", status.map_name);
            println!("players: {}/{}", status.players.online, status.players.max);
            for player in &status.players.list {
                println!("  {player}");
            }
            if !status.software.plugins.is_empty() {
                println!("plugins: {}", status.software.plugins.join(", "));
            }
        }
        "bedrock" => {
            let address = Address::parse(&args.address, mcstat::bedrock::DEFAULT_PORT)?;
            let status = mcstat::get_status(Bedrock::new(address, timeout))?;
            println!("edition: {:?}", status.edition);
            println!("version: {} ({})", status.version_name, status.protocol_version);
            println!("description:\n{}", render(&status.motd, args.html));
            println!("players: {}/{}", status.players_online, status.players_max);
            println!("latency: {}ms", status.latency.as_millis());
        }
        other => return Err(format!("unknown protocol {other:?}").into()),
    }

    Ok(())
}
