//! UDP tracker frames ([BEP-15]), single info-hash scrape only.
//!
//! ```text
//! connect request   connection_id:u64 = 0x41727101980 | action:u32 = 0 | transaction_id:i32
//! scrape request    connection_id:u64 | action:u32 = 2 | transaction_id:i32 | info_hash:[u8; 20]
//! connect response  action:u32 = 0 | transaction_id:i32 | connection_id:u64
//! scrape response   action:u32 = 2 | transaction_id:i32 | complete:u32 | downloaded:u32 | incomplete:u32
//! error response    action:u32 = 3 | transaction_id:i32 | message:[u8]
//! ```
//!
//! All integers are big-endian.
//!
//! [BEP-15]: http://bittorrent.org/beps/bep_0015.html

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::TrackerError;
use super::response::SwarmState;
use crate::constants::{
    ACTION_CONNECT, ACTION_ERROR, ACTION_SCRAPE, CONNECT_FRAME_LEN, MIN_RESPONSE_LEN,
    SCRAPE_REQUEST_LEN, SCRAPE_RESPONSE_LEN, UDP_PROTOCOL_ID,
};
use crate::torrent::InfoHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub transaction_id: i32,
}

impl ConnectRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONNECT_FRAME_LEN);
        buf.put_u64(UDP_PROTOCOL_ID);
        buf.put_u32(ACTION_CONNECT);
        buf.put_i32(self.transaction_id);
        buf.freeze()
    }

    /// Tracker-side decoding.
    pub fn decode(mut data: &[u8]) -> Result<Self, TrackerError> {
        expect_len(data, CONNECT_FRAME_LEN, "connect request")?;
        if data.get_u64() != UDP_PROTOCOL_ID {
            return Err(invalid("connect request without protocol id"));
        }
        expect_action(data.get_u32(), ACTION_CONNECT)?;
        Ok(Self {
            transaction_id: data.get_i32(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub connection_id: u64,
    pub transaction_id: i32,
    pub info_hash: InfoHash,
}

impl ScrapeRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SCRAPE_REQUEST_LEN);
        buf.put_u64(self.connection_id);
        buf.put_u32(ACTION_SCRAPE);
        buf.put_i32(self.transaction_id);
        buf.put_slice(self.info_hash.as_bytes());
        buf.freeze()
    }

    /// Tracker-side decoding.
    pub fn decode(mut data: &[u8]) -> Result<Self, TrackerError> {
        expect_len(data, SCRAPE_REQUEST_LEN, "scrape request")?;
        let connection_id = data.get_u64();
        expect_action(data.get_u32(), ACTION_SCRAPE)?;
        let transaction_id = data.get_i32();
        let mut info_hash = [0u8; 20];
        data.copy_to_slice(&mut info_hash);

        Ok(Self {
            connection_id,
            transaction_id,
            info_hash: InfoHash::new(info_hash),
        })
    }
}

/// A frame received from a UDP tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Connect {
        transaction_id: i32,
        connection_id: u64,
    },
    Scrape {
        transaction_id: i32,
        state: SwarmState,
    },
    Error {
        transaction_id: i32,
        message: String,
    },
}

impl Response {
    /// Decodes a tracker datagram, dispatching on its action code.
    ///
    /// The datagram must be exactly as long as its action requires; error
    /// frames carry a free-form message after the header.
    pub fn parse(data: &[u8]) -> Result<Self, TrackerError> {
        if data.len() < MIN_RESPONSE_LEN {
            return Err(invalid(format!("{} byte packet", data.len())));
        }

        let action = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let mut body = &data[4..];
        match action {
            ACTION_CONNECT => {
                expect_len(data, CONNECT_FRAME_LEN, "connect response")?;
                Ok(Response::Connect {
                    transaction_id: body.get_i32(),
                    connection_id: body.get_u64(),
                })
            }
            ACTION_SCRAPE => {
                expect_len(data, SCRAPE_RESPONSE_LEN, "scrape response")?;
                Ok(Response::Scrape {
                    transaction_id: body.get_i32(),
                    state: SwarmState {
                        complete: body.get_u32(),
                        downloaded: body.get_u32(),
                        incomplete: body.get_u32(),
                    },
                })
            }
            ACTION_ERROR => Ok(Response::Error {
                transaction_id: body.get_i32(),
                message: String::from_utf8_lossy(body).into_owned(),
            }),
            other => Err(invalid(format!("unknown action {other}"))),
        }
    }

    /// Tracker-side encoding.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SCRAPE_RESPONSE_LEN);
        match self {
            Response::Connect {
                transaction_id,
                connection_id,
            } => {
                buf.put_u32(ACTION_CONNECT);
                buf.put_i32(*transaction_id);
                buf.put_u64(*connection_id);
            }
            Response::Scrape {
                transaction_id,
                state,
            } => {
                buf.put_u32(ACTION_SCRAPE);
                buf.put_i32(*transaction_id);
                buf.put_u32(state.complete);
                buf.put_u32(state.downloaded);
                buf.put_u32(state.incomplete);
            }
            Response::Error {
                transaction_id,
                message,
            } => {
                buf.put_u32(ACTION_ERROR);
                buf.put_i32(*transaction_id);
                buf.put_slice(message.as_bytes());
            }
        }
        buf.freeze()
    }

    pub fn transaction_id(&self) -> i32 {
        match self {
            Response::Connect { transaction_id, .. }
            | Response::Scrape { transaction_id, .. }
            | Response::Error { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Response::Connect { .. } => "connect",
            Response::Scrape { .. } => "scrape",
            Response::Error { .. } => "error",
        }
    }
}

fn invalid(msg: impl Into<String>) -> TrackerError {
    TrackerError::InvalidResponse(msg.into())
}

fn expect_len(data: &[u8], len: usize, what: &str) -> Result<(), TrackerError> {
    if data.len() != len {
        return Err(invalid(format!(
            "{what} must be {len} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

fn expect_action(action: u32, expected: u32) -> Result<(), TrackerError> {
    if action != expected {
        return Err(invalid(format!("expected action {expected}, got {action}")));
    }
    Ok(())
}
