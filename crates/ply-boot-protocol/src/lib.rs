#![forbid(unsafe_code)]

//! Wire framing for the control-socket protocol (spec §4.6).
//!
//! Request: one command byte, then a flag byte (`\x02` if an argument
//! follows), then (if set) a one-byte length `N` and `N` bytes of
//! argument. Response: `ACK` (`\x06`), `NAK` (`\x15`), a typed answer
//! (`\x02`, length, payload), or `NO_ANSWER` (`\x05`).

use ply_core::{Error, Result};

pub const SOCKET_PATH: &str = "\0/ply-boot-protocol";

const HAS_ARGUMENT: u8 = 0x02;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const ANSWER: u8 = 0x02;
const NO_ANSWER: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    UpdateStatus(String),
    SystemInitialized,
    Error,
    ShowSplash,
    HideSplash,
    Quit,
    NewRoot(String),
    AskPassword,
}

impl Command {
    fn byte(&self) -> u8 {
        match self {
            Command::Ping => b'P',
            Command::UpdateStatus(_) => b'U',
            Command::SystemInitialized => b'S',
            Command::Error => b'!',
            Command::ShowSplash => b'$',
            Command::HideSplash => b'H',
            Command::Quit => b'Q',
            Command::NewRoot(_) => b'R',
            Command::AskPassword => b'*',
        }
    }

    fn argument(&self) -> Option<&str> {
        match self {
            Command::UpdateStatus(s) | Command::NewRoot(s) => Some(s),
            _ => None,
        }
    }

    /// Encode this command as a request frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.byte()];
        match self.argument() {
            Some(arg) => {
                out.push(HAS_ARGUMENT);
                out.push(arg.len().min(255) as u8);
                out.extend_from_slice(&arg.as_bytes()[..arg.len().min(255)]);
            }
            None => out.push(0),
        }
        out
    }

    /// Decode one request frame from `bytes`. Returns `Ok(None)` when
    /// `bytes` holds a valid-so-far but incomplete frame (the caller
    /// should wait for more bytes to arrive); `Err` for a frame that can
    /// never become valid, which per spec.md §4.6 means the caller
    /// should drop the connection rather than retry.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Command, usize)>> {
        let &[cmd_byte, has_arg, ref rest @ ..] = bytes else {
            return Ok(None); // fewer than 2 bytes buffered so far
        };

        let (argument, consumed) = if has_arg == HAS_ARGUMENT {
            let &[len, ref data @ ..] = rest else {
                return Ok(None); // length byte not arrived yet
            };
            let len = len as usize;
            if data.len() < len {
                return Ok(None); // argument bytes not all arrived yet
            }
            let s = std::str::from_utf8(&data[..len])
                .map_err(|_| Error::protocol("request argument is not valid UTF-8"))?
                .to_string();
            (Some(s), 3 + len)
        } else if has_arg != 0 {
            return Err(Error::protocol(format!("invalid has-argument flag byte {has_arg:#x}")));
        } else {
            (None, 2)
        };

        let command = match cmd_byte {
            b'P' => Command::Ping,
            b'U' => Command::UpdateStatus(argument.unwrap_or_default()),
            b'S' => Command::SystemInitialized,
            b'!' => Command::Error,
            b'$' => Command::ShowSplash,
            b'H' => Command::HideSplash,
            b'Q' => Command::Quit,
            b'R' => Command::NewRoot(argument.unwrap_or_default()),
            b'*' => Command::AskPassword,
            other => return Err(Error::protocol(format!("unknown command byte {other:#x}"))),
        };

        Ok(Some((command, consumed)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Nak,
    Answer(Vec<u8>),
    NoAnswer,
}

impl Response {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Ack => vec![ACK],
            Response::Nak => vec![NAK],
            Response::NoAnswer => vec![NO_ANSWER],
            Response::Answer(payload) => {
                let mut out = vec![ANSWER, payload.len().min(255) as u8];
                out.extend_from_slice(&payload[..payload.len().min(255)]);
                out
            }
        }
    }

    /// Decode one response frame. Returns `Ok(None)` for a valid-so-far
    /// but incomplete frame (wait for more bytes); `Err` for a frame that
    /// can never become valid (close the connection).
    pub fn decode(bytes: &[u8]) -> Result<Option<(Response, usize)>> {
        match bytes.first() {
            Some(&ACK) => Ok(Some((Response::Ack, 1))),
            Some(&NAK) => Ok(Some((Response::Nak, 1))),
            Some(&NO_ANSWER) => Ok(Some((Response::NoAnswer, 1))),
            Some(&ANSWER) => {
                let &[_, len, ref data @ ..] = bytes else {
                    return Ok(None); // length byte not arrived yet
                };
                let len = len as usize;
                if data.len() < len {
                    return Ok(None); // payload bytes not all arrived yet
                }
                Ok(Some((Response::Answer(data[..len].to_vec()), 2 + len)))
            }
            Some(other) => Err(Error::protocol(format!("unknown response byte {other:#x}"))),
            None => Ok(None), // no bytes buffered yet
        }
    }
}

/// Answers accumulate across repeat `ask-password` queries and are
/// returned NUL-separated without re-prompting, per spec.md §4.6.
#[derive(Debug, Clone, Default)]
pub struct AnswerCache {
    answers: Vec<Vec<u8>>,
}

impl AnswerCache {
    pub fn push(&mut self, answer: Vec<u8>) {
        self.answers.push(answer);
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// All cached answers joined with NUL separators, as one `Answer`
    /// payload.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, answer) in self.answers.iter().enumerate() {
            if i > 0 {
                out.push(0);
            }
            out.extend_from_slice(answer);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips_with_no_argument() {
        let encoded = Command::Ping.encode();
        assert_eq!(encoded, vec![b'P', 0]);
        let (decoded, consumed) = Command::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, Command::Ping);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn update_status_round_trips_with_argument() {
        let cmd = Command::UpdateStatus("Loading things".to_string());
        let encoded = cmd.encode();
        assert_eq!(encoded[0], b'U');
        assert_eq!(encoded[1], HAS_ARGUMENT);
        let (decoded, consumed) = Command::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, cmd);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn decode_rejects_unknown_command_byte() {
        let err = Command::decode(&[b'Z', 0]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn decode_waits_for_more_bytes_on_truncated_argument() {
        // declares a 5-byte argument but only 2 have arrived so far
        let result = Command::decode(&[b'U', HAS_ARGUMENT, 5, b'h', b'i']).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn decode_rejects_invalid_utf8_argument() {
        let err = Command::decode(&[b'U', HAS_ARGUMENT, 2, 0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn answer_response_round_trips() {
        let resp = Response::Answer(b"hunter2".to_vec());
        let encoded = resp.encode();
        let (decoded, consumed) = Response::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn response_decode_waits_for_more_bytes_on_truncated_payload() {
        let result = Response::decode(&[ANSWER, 5, b'h', b'i']).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn answer_cache_joins_with_nul() {
        let mut cache = AnswerCache::default();
        cache.push(b"one".to_vec());
        cache.push(b"two".to_vec());
        assert_eq!(cache.to_payload(), b"one\0two".to_vec());
    }
}
