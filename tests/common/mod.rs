//! Fake servers on loopback sockets, each answering a single exchange on a
//! background thread.

#![allow(dead_code)]

use std::{
    io::{self, Read, Write},
    net::{TcpListener, TcpStream, UdpSocket},
    thread,
};

pub const STATUS_JSON: &str = r#"{"description":{"text":"§aHello","extra":[{"text":" world","bold":true}]},"players":{"max":20,"online":1,"sample":[{"name":"Notch","id":"069a79f4-44e9-4726-a5be-fca90e38aaf5"}]},"version":{"name":"1.20.1","protocol":763}}"#;
pub const CHALLENGE: i32 = 9_513_307;
pub const BEDROCK_PAYLOAD: &str = "MCPE;§bBedrock;475;1.19.60;3;10;12345;Level;Survival;1;19132;19133;";

const RAKNET_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

fn varint(mut value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        if value & !0x7F == 0 {
            out.push(value as u8);
            return out;
        }
        out.push((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
}

fn read_varint(stream: &mut impl Read) -> io::Result<u32> {
    let mut value = 0;
    for i in 0..5 {
        let mut byte = [0];
        stream.read_exact(&mut byte)?;
        value |= u32::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            break;
        }
    }
    Ok(value)
}

fn read_frame(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let len = read_varint(stream)?;
    let mut body = vec![0; len as usize];
    stream.read_exact(&mut body)?;
    Ok(body)
}

fn write_frame(stream: &mut impl Write, body: &[u8]) -> io::Result<()> {
    let mut frame = varint(body.len() as u32);
    frame.extend_from_slice(body);
    stream.write_all(&frame)
}

fn drain(stream: &mut TcpStream) {
    let _ = io::copy(stream, &mut io::sink());
}

/// A modern server. When `answer_ping` is false the ping is left unanswered
/// and the connection held open until the client closes it.
pub fn java_server(json: &'static str, answer_ping: bool) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let handshake = read_frame(&mut stream).unwrap();
        assert_eq!(handshake[0], 0x00);
        assert_eq!(*handshake.last().unwrap(), 0x01, "next state is status");
        assert_eq!(read_frame(&mut stream).unwrap(), [0x00]);

        let mut status = vec![0x00];
        status.extend(varint(json.len() as u32));
        status.extend_from_slice(json.as_bytes());
        write_frame(&mut stream, &status).unwrap();

        if answer_ping {
            if let Ok(ping) = read_frame(&mut stream) {
                assert_eq!(ping[0], 0x01);
                write_frame(&mut stream, &ping).unwrap();
            }
        }
        drain(&mut stream);
    });
    port
}

/// A pre-1.7 server answering any request with `reply` in a kick packet.
pub fn legacy_server(reply: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut first = [0];
        stream.read_exact(&mut first).unwrap();
        assert_eq!(first[0], 0xFE);

        let units: Vec<u16> = reply.encode_utf16().collect();
        let mut kick = vec![0xFF];
        kick.extend_from_slice(&(units.len() as u16).to_be_bytes());
        for unit in units {
            kick.extend_from_slice(&unit.to_be_bytes());
        }
        stream.write_all(&kick).unwrap();
        drain(&mut stream);
    });
    port
}

/// A Query server. Before each real reply it sends one meant for another
/// session, which the client must ignore.
pub fn query_server() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    thread::spawn(move || {
        let mut buf = [0; 1500];

        let (len, peer) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..3], [0xFE, 0xFD, 0x09]);
        assert_eq!(len, 7);
        let session: [u8; 4] = buf[3..7].try_into().unwrap();
        let foreign: Vec<u8> = session.iter().map(|b| b ^ 0x01).collect();

        let mut reply = vec![0x09];
        reply.extend_from_slice(&foreign);
        reply.extend_from_slice(b"1\0");
        socket.send_to(&reply, peer).unwrap();

        let mut reply = vec![0x09];
        reply.extend_from_slice(&session);
        reply.extend_from_slice(format!("{CHALLENGE}\0").as_bytes());
        socket.send_to(&reply, peer).unwrap();

        let (len, peer) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..3], [0xFE, 0xFD, 0x00]);
        assert_eq!(buf[3..7], session);
        assert_eq!(buf[7..11], CHALLENGE.to_be_bytes());

        let mut reply = vec![0x00];
        reply.extend_from_slice(&session);
        if len == 15 {
            reply.extend_from_slice(b"splitnum\0\x80\0");
            reply.extend_from_slice(
                b"hostname\0A \xa7aQuery\0gametype\0SMP\0game_id\0MINECRAFT\0version\x001.20.1\0\
                  plugins\0Paper on 1.20.1: LuckPerms 5.4\0map\0world\0numplayers\x002\0maxplayers\x0020\0\
                  hostport\x0025565\0hostip\x00127.0.0.1\0\0\x01player_\0\0Alex\0Steve\0\0",
            );
        } else {
            reply.extend_from_slice(b"A Query\0SMP\0world\x002\x0020\0");
            reply.extend_from_slice(&25565u16.to_le_bytes());
            reply.extend_from_slice(b"127.0.0.1\0");
        }
        socket.send_to(&reply, peer).unwrap();
    });
    port
}

/// A Bedrock server answering one unconnected ping with `payload`.
pub fn bedrock_server(payload: &'static str) -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    thread::spawn(move || {
        let mut buf = [0; 1500];
        let (len, peer) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(len, 33);
        assert_eq!(buf[0], 0x01);
        assert_eq!(buf[9..25], RAKNET_MAGIC);

        let mut pong = vec![0x1C];
        pong.extend_from_slice(&buf[1..9]);
        pong.extend_from_slice(&0x0123_4567_89AB_CDEFu64.to_be_bytes());
        pong.extend_from_slice(&RAKNET_MAGIC);
        pong.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        pong.extend_from_slice(payload.as_bytes());
        socket.send_to(&pong, peer).unwrap();
    });
    port
}

/// A bound UDP socket that never answers. Keep it alive for the test.
pub fn silent_udp() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

/// A port nothing listens on.
pub fn closed_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
