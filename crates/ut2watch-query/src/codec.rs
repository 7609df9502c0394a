//! UT2004 query wire format.
//!
//! Every datagram starts with a 4-byte header and a section byte:
//!
//! ```text
//! request:  78 00 00 00 <section>
//! response: 80 00 00 00 <section> <payload...>
//! ```
//!
//! Integers are little-endian `i32`. Strings carry a length byte that
//! counts the trailing NUL; with the high bit set the low seven bits count
//! UTF-16LE code units instead of Latin-1 bytes. Player and server names
//! may embed colour codes (`1B r g b`), which are stripped here.

use bytes::Buf;

use ut2watch_state::{Player, Rule, ServerInfo};

use crate::error::{QueryError, QueryResult};

pub const REQUEST_HEADER: [u8; 4] = [0x78, 0x00, 0x00, 0x00];
pub const RESPONSE_HEADER: [u8; 4] = [0x80, 0x00, 0x00, 0x00];

const COLOR_ESCAPE: char = '\u{1b}';

/// Query sections a server can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Info,
    Rules,
    Players,
}

impl Section {
    pub fn code(self) -> u8 {
        match self {
            Section::Info => 0x00,
            Section::Rules => 0x01,
            Section::Players => 0x02,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Section::Info),
            0x01 => Some(Section::Rules),
            0x02 => Some(Section::Players),
            _ => None,
        }
    }
}

/// Build the request datagram for one section.
pub fn encode_request(section: Section) -> [u8; 5] {
    let [a, b, c, d] = REQUEST_HEADER;
    [a, b, c, d, section.code()]
}

/// Validate a response header and split off its payload.
pub fn split_response(packet: &[u8]) -> QueryResult<(Section, &[u8])> {
    if packet.len() < RESPONSE_HEADER.len() + 1 {
        return Err(QueryError::Malformed(format!(
            "datagram too short ({} bytes)",
            packet.len()
        )));
    }
    let (header, rest) = packet.split_at(RESPONSE_HEADER.len());
    if header != RESPONSE_HEADER {
        return Err(QueryError::Malformed(format!("bad header {header:02x?}")));
    }
    let section = Section::from_code(rest[0])
        .ok_or_else(|| QueryError::Malformed(format!("unknown section {:#04x}", rest[0])))?;
    Ok((section, &rest[1..]))
}

/// Decode a server info payload. Fields after the player counts are ignored.
pub fn decode_info(mut payload: &[u8]) -> QueryResult<ServerInfo> {
    let buf = &mut payload;

    let _server_id = get_i32(buf)?;
    let _server_ip = get_string(buf)?;
    let game_port = get_i32(buf)?;
    let query_port = get_i32(buf)?;
    let server_name = get_string(buf)?;
    let map_name = get_string(buf)?;
    let game_type = get_string(buf)?;
    let current_players = get_i32(buf)?;
    let max_players = get_i32(buf)?;

    Ok(ServerInfo {
        server_name,
        map_name,
        game_type,
        current_players: clamp_unsigned(current_players),
        max_players: clamp_unsigned(max_players),
        game_port: clamp_port(game_port),
        query_port: clamp_port(query_port),
    })
}

/// Decode a rules payload: key/value string pairs until the end.
pub fn decode_rules(mut payload: &[u8]) -> QueryResult<Vec<Rule>> {
    let buf = &mut payload;
    let mut rules = Vec::new();
    while buf.has_remaining() {
        let key = get_string(buf)?;
        let value = get_string(buf)?;
        rules.push(Rule { key, value });
    }
    Ok(rules)
}

/// Decode a players payload: fixed-shape records until the end.
pub fn decode_players(mut payload: &[u8]) -> QueryResult<Vec<Player>> {
    let buf = &mut payload;
    let mut players = Vec::new();
    while buf.has_remaining() {
        let _player_id = get_i32(buf)?;
        let name = get_string(buf)?;
        let ping = get_i32(buf)?;
        let score = get_i32(buf)?;
        let _stats_id = get_i32(buf)?;
        players.push(Player {
            name,
            score,
            ping: clamp_unsigned(ping),
        });
    }
    Ok(players)
}

fn get_i32(buf: &mut &[u8]) -> QueryResult<i32> {
    if buf.remaining() < 4 {
        return Err(QueryError::Malformed("truncated integer".to_string()));
    }
    Ok(buf.get_i32_le())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> QueryResult<&'a [u8]> {
    if buf.remaining() < n {
        return Err(QueryError::Malformed(format!(
            "string of {n} bytes overruns datagram"
        )));
    }
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(n);
    *buf = tail;
    Ok(head)
}

fn get_string(buf: &mut &[u8]) -> QueryResult<String> {
    if !buf.has_remaining() {
        return Err(QueryError::Malformed("missing string length".to_string()));
    }
    let len = buf.get_u8();

    let raw: String = if len & 0x80 != 0 {
        let units = usize::from(len & 0x7f);
        let bytes = take(buf, units * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        // Latin-1 maps byte-for-byte onto the first 256 code points.
        take(buf, usize::from(len))?
            .iter()
            .map(|&b| char::from(b))
            .collect()
    };

    Ok(strip_colors(raw.trim_end_matches('\0')))
}

/// Remove UT2 colour codes (escape followed by three colour bytes).
pub fn strip_colors(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == COLOR_ESCAPE {
            chars.by_ref().take(3).for_each(drop);
        } else {
            out.push(c);
        }
    }
    out
}

fn clamp_unsigned(v: i32) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

fn clamp_port(v: i32) -> u16 {
    u16::try_from(v).unwrap_or(0)
}
