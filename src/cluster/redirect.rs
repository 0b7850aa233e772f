/// MOVED and ASK redirections
///
/// `MOVED <slot> <host:port>` means the slot has a new owner for good;
/// `ASK <slot> <host:port>` redirects a single command during a migration.
use crate::core::Endpoint;
use crate::error::TopologyError;
use crate::protocol::Reply;

const BYTE_SPACE: u8 = b' ';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    Moved { slot: u16, endpoint: Endpoint },
    Ask { slot: u16, endpoint: Endpoint },
}

impl Redirect {
    /// Parse an error message. `Ok(None)` if it isn't a redirection.
    pub fn parse(message: &[u8]) -> Result<Option<Redirect>, TopologyError> {
        let (moved, rest) = if let Some(rest) = message.strip_prefix(b"MOVED") {
            (true, rest)
        } else if let Some(rest) = message.strip_prefix(b"ASK") {
            (false, rest)
        } else {
            return Ok(None);
        };

        let invalid = || TopologyError::InvalidRedirect(String::from_utf8_lossy(message).into_owned());

        let rest = match rest.split_first() {
            Some((&BYTE_SPACE, rest)) => rest,
            _ => return Ok(None),
        };
        let pos = rest.iter().position(|&b| b == BYTE_SPACE).ok_or_else(invalid)?;
        let slot = btoi::btou::<u16>(&rest[..pos]).map_err(|_| invalid())?;
        if usize::from(slot) >= super::SLOT_COUNT {
            return Err(invalid());
        }

        let address = std::str::from_utf8(&rest[pos + 1..]).map_err(|_| invalid())?;
        let address = address.trim_end_matches(['\r', '\n']);
        let endpoint: Endpoint = address.parse().map_err(|_| invalid())?;

        Ok(Some(if moved {
            Redirect::Moved { slot, endpoint }
        } else {
            Redirect::Ask { slot, endpoint }
        }))
    }

    /// Redirection carried by an error reply, if any
    pub fn from_reply(reply: &Reply) -> Result<Option<Redirect>, TopologyError> {
        match reply {
            Reply::Error(message) => Self::parse(message.as_bytes()),
            _ => Ok(None),
        }
    }

    pub fn slot(&self) -> u16 {
        match self {
            Redirect::Moved { slot, .. } | Redirect::Ask { slot, .. } => *slot,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Redirect::Moved { endpoint, .. } | Redirect::Ask { endpoint, .. } => endpoint,
        }
    }

    /// ASK targets need `ASKING` before the redirected command
    pub fn requires_asking(&self) -> bool {
        matches!(self, Redirect::Ask { .. })
    }
}
