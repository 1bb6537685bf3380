//! Message of the day parsing and rendering.
//!
//! A [`Motd`] is parsed once, from either a `§`-coded string or a JSON chat
//! component, into a flat list of [`MotdComponent`]s. Transformers in
//! [`transformers`] turn that list into plain text, `§` codes, HTML or ANSI.

mod components;
mod simplify;
pub mod transformers;

use serde_json::{Map, Value};
use tracing::debug;

pub use components::{Formatting, MinecraftColor, MotdComponent, TranslationTag, WebColor};
use transformers::{AnsiTransformer, HtmlTransformer, MinecraftTransformer, PlainTransformer, Transformer};

/// The MOTD exactly as the server sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMotd {
    Text(String),
    Json(Value),
}

/// A parsed MOTD.
#[derive(Debug, Clone, PartialEq)]
pub struct Motd {
    /// The parsed components, in order. May be empty.
    pub parsed: Vec<MotdComponent>,
    pub raw: RawMotd,
    /// Whether the MOTD came from a Bedrock server. This enables `§g` and
    /// switches the HTML shadow palette.
    pub bedrock: bool,
}

impl Motd {
    /// Parses a `§`- or `&`-coded string.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcstat::motd::{Formatting, MinecraftColor, Motd, MotdComponent};
    ///
    /// let motd = Motd::parse("§aHello §lworld", false);
    /// assert_eq!(
    ///     motd.parsed,
    ///     [
    ///         MotdComponent::Color(MinecraftColor::Green),
    ///         MotdComponent::Text("Hello ".into()),
    ///         MotdComponent::Formatting(Formatting::Bold),
    ///         MotdComponent::Text("world".into()),
    ///     ]
    /// );
    /// assert_eq!(motd.to_plain(), "Hello world");
    /// ```
    #[must_use]
    pub fn parse(raw: &str, bedrock: bool) -> Self {
        Self {
            parsed: Lexer::new(bedrock).run(raw),
            raw: RawMotd::Text(raw.to_string()),
            bedrock,
        }
    }

    /// Parses a JSON chat component: a string, an object or a list of
    /// components. `null` yields an empty MOTD.
    #[must_use]
    pub fn from_json(value: &Value, bedrock: bool) -> Self {
        let parsed = match value {
            Value::Null => Vec::new(),
            Value::String(text) => Lexer::new(bedrock).run(text),
            Value::Object(item) => parse_component(item, bedrock, Vec::new()),
            Value::Array(extra) => {
                let mut item = Map::new();
                item.insert("extra".to_string(), Value::Array(extra.clone()));
                parse_component(&item, bedrock, Vec::new())
            }
            other => Lexer::new(bedrock).run(&other.to_string()),
        };
        Self {
            parsed,
            raw: RawMotd::Json(value.clone()),
            bedrock,
        }
    }

    /// Returns a copy without components that have no visible effect, with
    /// adjacent text runs merged.
    #[must_use]
    pub fn simplify(&self) -> Self {
        Self {
            parsed: simplify::simplify(&self.parsed),
            raw: self.raw.clone(),
            bedrock: self.bedrock,
        }
    }

    /// The text without any colors or formatting.
    #[must_use]
    pub fn to_plain(&self) -> String {
        PlainTransformer.transform(&self.parsed)
    }

    /// The MOTD as `§` codes. `&` markers and uppercase codes come out in
    /// canonical lowercase `§` form.
    #[must_use]
    pub fn to_minecraft(&self) -> String {
        MinecraftTransformer.transform(&self.parsed)
    }

    /// The MOTD as an HTML paragraph. Obfuscated text is wrapped in
    /// `<span class=obfuscated>`; styling that class is up to the page.
    #[must_use]
    pub fn to_html(&self) -> String {
        HtmlTransformer::new(self.bedrock).transform(&self.parsed)
    }

    /// The MOTD with 24-bit ANSI escape sequences.
    #[must_use]
    pub fn to_ansi(&self) -> String {
        AnsiTransformer.transform(&self.parsed)
    }
}

#[derive(Clone, Copy)]
enum LexState {
    Text,
    /// A marker (`§` or `&`) was read.
    Escape(char),
    /// `§#` was read; collecting up to six hex digits.
    Hex(char, usize),
}

/// Single pass scanner over a coded string.
struct Lexer {
    bedrock: bool,
    out: Vec<MotdComponent>,
    text: String,
}

impl Lexer {
    const fn new(bedrock: bool) -> Self {
        Self {
            bedrock,
            out: Vec::new(),
            text: String::new(),
        }
    }

    const fn is_marker(c: char) -> bool {
        matches!(c, '§' | '&')
    }

    fn emit(&mut self, component: MotdComponent) {
        self.flush_text();
        self.out.push(component);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.out.push(MotdComponent::Text(text));
        }
    }

    /// Maps the character after a marker to a component, if it is a code.
    fn code(&self, code: char) -> Option<MotdComponent> {
        if let Some(color) = MinecraftColor::from_code(code) {
            if color == MinecraftColor::MinecoinGold && !self.bedrock {
                return None;
            }
            return Some(MotdComponent::Color(color));
        }
        Formatting::from_code(code).map(MotdComponent::Formatting)
    }

    fn run(mut self, raw: &str) -> Vec<MotdComponent> {
        let mut state = LexState::Text;
        let mut hex_start = 0;

        for (i, c) in raw.char_indices() {
            state = match state {
                LexState::Text => self.text_char(c),
                LexState::Escape(marker) => {
                    if c == '#' && !self.bedrock {
                        hex_start = i + c.len_utf8();
                        LexState::Hex(marker, 0)
                    } else if let Some(component) = self.code(c) {
                        self.emit(component);
                        LexState::Text
                    } else {
                        self.text.push(marker);
                        self.text_char(c)
                    }
                }
                LexState::Hex(marker, digits) if c.is_ascii_hexdigit() => {
                    if digits + 1 == 6 {
                        match WebColor::from_hex(&raw[hex_start..i + 1]) {
                            Some(color) => self.emit(MotdComponent::WebColor(color)),
                            None => self.literal_hex(marker, &raw[hex_start..=i]),
                        }
                        LexState::Text
                    } else {
                        LexState::Hex(marker, digits + 1)
                    }
                }
                LexState::Hex(marker, _) => {
                    self.literal_hex(marker, &raw[hex_start..i]);
                    self.text_char(c)
                }
            };
        }

        match state {
            LexState::Text => {}
            LexState::Escape(marker) => self.text.push(marker),
            LexState::Hex(marker, _) => self.literal_hex(marker, &raw[hex_start..]),
        }
        self.flush_text();
        self.out
    }

    fn text_char(&mut self, c: char) -> LexState {
        if Self::is_marker(c) {
            LexState::Escape(c)
        } else {
            self.text.push(c);
            LexState::Text
        }
    }

    fn literal_hex(&mut self, marker: char, digits: &str) {
        self.text.push(marker);
        self.text.push('#');
        self.text.push_str(digits);
    }
}

fn parse_color(color: &str) -> Option<MotdComponent> {
    if let Some(color) = MinecraftColor::from_name(color) {
        return Some(MotdComponent::Color(color));
    }
    if color == "reset" {
        // servers send reset as a color, but it clears styles too
        return Some(MotdComponent::Formatting(Formatting::Reset));
    }
    WebColor::from_hex(color).map(MotdComponent::WebColor)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Flattens one chat component and its `extra` children. `inherited` holds
/// the styles of the parent.
fn parse_component(
    item: &Map<String, Value>,
    bedrock: bool,
    inherited: Vec<MotdComponent>,
) -> Vec<MotdComponent> {
    let mut parsed = inherited;

    if let Some(color) = item.get("color").and_then(Value::as_str) {
        match parse_color(color) {
            Some(component) => parsed.push(component),
            None => debug!(color, "ignoring unknown MOTD color"),
        }
    }

    for style in Formatting::ALL {
        match item.get(style.json_key()) {
            Some(Value::Bool(false)) => {
                let style = MotdComponent::Formatting(style);
                // servers send `false` for styles that were never set, too
                if let Some(pos) = parsed.iter().position(|c| *c == style) {
                    parsed.remove(pos);
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => parsed.push(MotdComponent::Formatting(style)),
        }
    }

    if let Some(text) = item.get("text").and_then(text_of) {
        parsed.extend(Lexer::new(bedrock).run(&text));
    }
    if let Some(id) = item.get("translate").and_then(text_of) {
        parsed.push(MotdComponent::Translation(TranslationTag { id }));
    }
    parsed.push(MotdComponent::Formatting(Formatting::Reset));

    if let Some(Value::Array(extra)) = item.get("extra") {
        let styles: Vec<MotdComponent> = parsed
            .iter()
            .filter(|c| {
                matches!(c, MotdComponent::Formatting(f) if *f != Formatting::Reset)
            })
            .cloned()
            .collect();

        for element in extra {
            match element {
                Value::Object(child) => {
                    parsed.extend(parse_component(child, bedrock, styles.clone()));
                }
                other => {
                    parsed.extend(styles.iter().cloned());
                    if let Some(text) = text_of(other) {
                        parsed.extend(Lexer::new(bedrock).run(&text));
                    }
                }
            }
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use MotdComponent::{Color, Text, Translation};

    fn text(s: &str) -> MotdComponent {
        Text(s.to_string())
    }

    fn fmt(f: Formatting) -> MotdComponent {
        MotdComponent::Formatting(f)
    }

    #[test]
    fn empty() {
        assert!(Motd::parse("", false).parsed.is_empty());
        assert!(Motd::from_json(&Value::Null, false).parsed.is_empty());
    }

    #[test]
    fn ampersand_and_uppercase_codes() {
        let motd = Motd::parse("&AGreen§LBold", false);
        assert_eq!(
            motd.parsed,
            [
                Color(MinecraftColor::Green),
                text("Green"),
                fmt(Formatting::Bold),
                text("Bold"),
            ]
        );
        assert_eq!(motd.to_minecraft(), "§aGreen§lBold");
    }

    #[test]
    fn unknown_codes_stay_literal() {
        let motd = Motd::parse("Tom & Jerry §z50%§", false);
        assert_eq!(motd.parsed, [text("Tom & Jerry §z50%§")]);
        assert_eq!(motd.to_plain(), "Tom & Jerry §z50%§");
    }

    #[test]
    fn doubled_marker() {
        assert_eq!(
            Motd::parse("§§a!", false).parsed,
            [text("§"), Color(MinecraftColor::Green), text("!")]
        );
    }

    #[test]
    fn minecoin_gold_is_bedrock_only() {
        assert_eq!(Motd::parse("§gx", false).parsed, [text("§gx")]);
        assert_eq!(
            Motd::parse("§gx", true).parsed,
            [Color(MinecraftColor::MinecoinGold), text("x")]
        );
    }

    #[test]
    fn web_colors_in_strings() {
        assert_eq!(
            Motd::parse("§#FF8000hot", false).parsed,
            [
                MotdComponent::WebColor(WebColor::from_rgb([255, 128, 0])),
                text("hot")
            ]
        );
        assert_eq!(Motd::parse("§#12zz", false).parsed, [text("§#12zz")]);
        assert_eq!(Motd::parse("§#123", false).parsed, [text("§#123")]);
        assert_eq!(Motd::parse("§#12§a", false).parsed, [text("§#12"), Color(MinecraftColor::Green)]);
        assert_eq!(Motd::parse("§#ff8000", true).parsed, [text("§#ff8000")]);
    }

    #[test]
    fn round_trips_canonical_strings() {
        for raw in [
            "A Minecraft Server",
            "§aHello§r §l§nworld",
            "§4§lRED §#00ff00gradient§k§m§o!",
            "\n§1line two",
            "50% off §z§",
        ] {
            let motd = Motd::parse(raw, false);
            assert_eq!(motd.to_minecraft(), raw);
            assert_eq!(Motd::parse(&motd.to_minecraft(), false).parsed, motd.parsed);
        }
    }

    #[test]
    fn json_plain_string_and_text_object() {
        assert_eq!(Motd::from_json(&json!("§bHi"), false).to_plain(), "Hi");
        assert_eq!(
            Motd::from_json(&json!({"text": "A Minecraft Server"}), false).parsed,
            [text("A Minecraft Server"), fmt(Formatting::Reset)]
        );
    }

    #[test]
    fn json_extra_inherits_styles() {
        let motd = Motd::from_json(
            &json!({
                "text": "",
                "bold": true,
                "extra": [
                    {"text": "a", "color": "red"},
                    {"text": "b", "bold": false, "italic": true},
                    "c",
                ],
            }),
            false,
        );
        assert_eq!(
            motd.parsed,
            [
                fmt(Formatting::Bold),
                fmt(Formatting::Reset),
                fmt(Formatting::Bold),
                Color(MinecraftColor::Red),
                text("a"),
                fmt(Formatting::Reset),
                fmt(Formatting::Italic),
                text("b"),
                fmt(Formatting::Reset),
                fmt(Formatting::Bold),
                text("c"),
            ]
        );
    }

    #[test]
    fn json_colors() {
        let motd = Motd::from_json(
            &json!({"extra": [
                {"text": "x", "color": "#ff0000"},
                {"text": "y", "color": "reset"},
                {"text": "z", "color": "not_a_color"},
                {"translate": "menu.title"},
            ]}),
            false,
        );
        assert_eq!(
            motd.parsed,
            [
                fmt(Formatting::Reset),
                MotdComponent::WebColor(WebColor::from_rgb([255, 0, 0])),
                text("x"),
                fmt(Formatting::Reset),
                fmt(Formatting::Reset),
                text("y"),
                fmt(Formatting::Reset),
                text("z"),
                fmt(Formatting::Reset),
                Translation(TranslationTag {
                    id: "menu.title".into()
                }),
                fmt(Formatting::Reset),
            ]
        );
        assert_eq!(motd.to_plain(), "xyz");
    }

    #[test]
    fn json_list_is_extra() {
        let motd = Motd::from_json(&json!(["a", {"text": "b"}]), false);
        assert_eq!(motd.to_plain(), "ab");
        assert!(matches!(motd.raw, RawMotd::Json(Value::Array(_))));
    }

    #[test]
    fn simplify_keeps_the_rendering() {
        let motd = Motd::from_json(&json!({"extra": ["a", {"text": "b"}, {"text": ""}]}), false);
        let simple = motd.simplify();
        assert_eq!(simple.parsed, [text("ab")]);
        assert_eq!(simple.to_plain(), motd.to_plain());
    }
}
