//! A scripted in-memory server for exercising the client.

use super::{
    packet::{Packet, PacketType},
    reassembly::SQUAD_END_MARKER,
    SQUAD_CHAT,
};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt, DuplexStream},
    task::JoinHandle,
};

pub(crate) const PASSWORD: &str = "hunter2";

/// Spawn a server that first writes `greeting`, then answers every packet
/// it recieves with whatever `script` returns. The task ends when the client
/// closes its side and yields every packet it recieved.
pub(crate) fn spawn<F>(greeting: Vec<u8>, mut script: F) -> (DuplexStream, JoinHandle<Vec<Packet>>)
where
    F: FnMut(&Packet) -> Vec<u8> + Send + 'static,
{
    let (client, mut server) = io::duplex(64 * 1024);

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let mut buffer = BytesMut::new();

        if !greeting.is_empty() && server.write_all(&greeting).await.is_err() {
            return received;
        }

        loop {
            while let Ok(Some(packet)) = Packet::decode_from(&mut buffer, 4106) {
                let reply = script(&packet);
                received.push(packet);

                if !reply.is_empty() && server.write_all(&reply).await.is_err() {
                    return received;
                }
            }

            match server.read_buf(&mut buffer).await {
                Ok(0) | Err(_) => return received,
                Ok(_) => {}
            }
        }
    });

    (client, handle)
}

/// Read the next packet the client sends, for servers that script their own timing.
pub(crate) async fn read_packet(stream: &mut DuplexStream, buffer: &mut BytesMut) -> Packet {
    loop {
        if let Some(packet) = Packet::decode_from(buffer, 4106).unwrap() {
            return packet;
        }
        assert_ne!(stream.read_buf(buffer).await.unwrap(), 0, "client hung up");
    }
}

/// Answer authentication the way SRCDS does, with an empty response first.
pub(crate) fn auth_reply(packet: &Packet) -> Option<Vec<u8>> {
    if packet.packet_type != PacketType::Auth {
        return None;
    }

    if packet.body == PASSWORD.as_bytes() {
        Some(concat(&[response(packet.id, ""), auth_response(packet.id)]))
    } else {
        Some(auth_response(-1).to_vec())
    }
}

pub(crate) fn response(id: i32, body: &str) -> Bytes {
    Packet::new(id, PacketType::ResponseValue, body.to_string()).encode()
}

pub(crate) fn auth_response(id: i32) -> Bytes {
    Packet::new(id, PacketType::AUTH_RESPONSE, Bytes::new()).encode()
}

pub(crate) fn chat(body: &str) -> Bytes {
    Packet::new(0, PacketType::Extension(SQUAD_CHAT), body.to_string()).encode()
}

/// What Squad sends in answer to the empty probe command.
pub(crate) fn squad_probe_echo(probe_id: i32) -> Bytes {
    let mut bytes = BytesMut::new();
    bytes.put(response(probe_id, ""));
    bytes.put(response(probe_id, ""));
    bytes.put_slice(SQUAD_END_MARKER);
    bytes.freeze()
}

pub(crate) fn concat(parts: &[Bytes]) -> Vec<u8> {
    parts.iter().flat_map(|part| part.iter().copied()).collect()
}

/// Whether `packet` is the empty probe that follows a command.
pub(crate) fn is_probe(packet: &Packet) -> bool {
    packet.packet_type == PacketType::ResponseValue && packet.body.is_empty()
}
