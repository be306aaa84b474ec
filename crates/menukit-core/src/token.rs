//! Callback tokens: the wire value of an interactive button.
//!
//! Format: `mk:<menu id>:<kind code>[:<instance id>]`. Menu ids and instance
//! ids never contain the delimiter, so decoding is a plain split.

use rand::{distributions::Alphanumeric, Rng};

pub const NAMESPACE: &str = "mk";
pub const DELIMITER: char = ':';

const INSTANCE_ID_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Button bound to a callback handler; carries an instance id.
    Callback,
    /// Button without a handler; acknowledged and otherwise ignored.
    Noop,
}

impl ActionKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Callback => "c",
            Self::Noop => "n",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Self::Callback),
            "n" => Some(Self::Noop),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionToken {
    pub kind: ActionKind,
    pub owner: String,
    pub instance: Option<String>,
}

pub fn encode(kind: ActionKind, owner: &str, instance: Option<&str>) -> String {
    match instance {
        Some(id) => format!("{NAMESPACE}{DELIMITER}{owner}{DELIMITER}{}{DELIMITER}{id}", kind.code()),
        None => format!("{NAMESPACE}{DELIMITER}{owner}{DELIMITER}{}", kind.code()),
    }
}

/// Parse a token minted by [`encode`].
///
/// `None` means "not ours": the caller passes the update on instead of
/// treating it as malformed input.
pub fn decode(token: &str) -> Option<ActionToken> {
    let mut parts = token.split(DELIMITER);
    if parts.next()? != NAMESPACE {
        return None;
    }
    let owner = parts.next()?;
    if owner.is_empty() {
        return None;
    }
    let kind = ActionKind::from_code(parts.next()?)?;
    let instance = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let instance = match (kind, instance) {
        (ActionKind::Callback, Some(id)) if !id.is_empty() => Some(id.to_string()),
        (ActionKind::Noop, None) => None,
        _ => return None,
    };

    Some(ActionToken {
        kind,
        owner: owner.to_string(),
        instance,
    })
}

/// Short random id distinguishing buttons of one menu.
///
/// Not globally unique; only needs to be unique within one menu's live handlers.
pub fn new_instance_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INSTANCE_ID_LEN)
        .map(char::from)
        .collect()
}

/// Whether `id` can be embedded in a token.
pub fn is_valid_owner(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && !id.contains(DELIMITER) && !id.chars().any(char::is_whitespace)
}
