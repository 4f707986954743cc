use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The alternate addressing space; Signal addresses derived from LID JIDs
/// carry a `_1` suffix on the bare user name (spec.md §3, §4.4).
pub const LID_SERVER: &str = "lid";
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// A WhatsApp address of the form `user[:device]@server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub device: u32,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    pub fn with_device(user: impl Into<String>, device: u32, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device,
            server: server.into(),
        }
    }

    pub fn is_lid(&self) -> bool {
        self.server == LID_SERVER
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device != 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl std::str::FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (user_part, server) = s
            .rsplit_once('@')
            .ok_or_else(|| Error::InvalidJid(format!("missing '@' in {s}")))?;

        if let Some((name, device)) = split_trailing_digits(user_part, ':') {
            return Ok(Jid::with_device(name, device, server));
        }
        if let Some((name, device)) = split_trailing_digits(user_part, '.') {
            return Ok(Jid::with_device(name, device, server));
        }
        Ok(Jid::new(user_part, server))
    }
}

/// Signal's per-device peer address: a bare user name plus device id.
///
/// For a LID-server JID the name carries a `_1` suffix (§4.4 rule 1), so
/// Signal addresses derived from a LID JID never collide with the bare
/// addressing space even if the user-part digits happen to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalAddress {
    pub name: String,
    pub device_id: u32,
}

impl SignalAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    /// `name:deviceId` key used to index the per-instance session cache.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.name, self.device_id)
    }
}

impl fmt::Display for SignalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.device_id)
    }
}

/// A foreign address value — the escape hatch for callers that hand in
/// something other than a `Jid`, a raw string, or a `(name, device)` pair
/// (spec §4.4: "a foreign address object with getName()/getDeviceId()").
pub trait ForeignAddress {
    fn get_name(&self) -> String;
    fn get_device_id(&self) -> u32;
}

/// Any shape `resolve_address` accepts (§4.4 rules 1-4).
pub enum AddressInput<'a> {
    Jid(&'a Jid),
    Raw(&'a str),
    NameDevice(String, u32),
    Foreign(&'a dyn ForeignAddress),
}

/// Centralizes JID → `SignalAddress` normalization; never parse JIDs ad hoc
/// elsewhere (spec §9 design note).
pub fn resolve_address(input: AddressInput<'_>) -> Result<SignalAddress> {
    match input {
        AddressInput::Jid(jid) => Ok(SignalAddress::new(
            apply_lid_suffix(&jid.user, jid.server == LID_SERVER),
            jid.device,
        )),
        AddressInput::NameDevice(name, device_id) => Ok(SignalAddress::new(name, device_id)),
        AddressInput::Foreign(addr) => Ok(SignalAddress::new(addr.get_name(), addr.get_device_id())),
        AddressInput::Raw(s) => {
            let (user_part, server) = s
                .rsplit_once('@')
                .ok_or_else(|| Error::InvalidJid(format!("missing '@' in {s}")))?;
            let is_lid = server == LID_SERVER;

            if let Some((name, device)) = split_trailing_digits(user_part, ':') {
                return Ok(SignalAddress::new(apply_lid_suffix(&name, is_lid), device));
            }
            if let Some((name, device)) = split_trailing_digits(user_part, '.') {
                return Ok(SignalAddress::new(apply_lid_suffix(&name, is_lid), device));
            }
            Ok(SignalAddress::new(apply_lid_suffix(user_part, is_lid), 0))
        }
    }
}

fn apply_lid_suffix(name: &str, is_lid: bool) -> String {
    if is_lid && !name.ends_with("_1") {
        format!("{name}_1")
    } else {
        name.to_string()
    }
}

/// Splits `left<sep>digits` on the last occurrence of `sep`, only when the
/// suffix is entirely numeric (rules 2/3 of §4.4: `:digits` preferred,
/// `.digits` as legacy compatibility).
fn split_trailing_digits(s: &str, sep: char) -> Option<(String, u32)> {
    let (left, right) = s.rsplit_once(sep)?;
    if !right.is_empty() && right.chars().all(|c| c.is_ascii_digit()) {
        right.parse::<u32>().ok().map(|d| (left.to_string(), d))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_jid() {
        let jid: Jid = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 0);
        assert_eq!(jid.to_string(), "1234567890@s.whatsapp.net");
    }

    #[test]
    fn parses_colon_device_jid() {
        let jid: Jid = "1234567890:5@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 5);
    }

    #[test]
    fn parses_legacy_dot_device_jid() {
        let jid: Jid = "1234567890.5@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 5);
    }

    #[test]
    fn resolve_address_appends_lid_suffix() {
        let jid = Jid::with_device("1234567890", 3, LID_SERVER);
        let addr = resolve_address(AddressInput::Jid(&jid)).unwrap();
        assert_eq!(addr.name, "1234567890_1");
        assert_eq!(addr.device_id, 3);
    }

    #[test]
    fn resolve_address_skips_double_suffix() {
        let jid = Jid::with_device("1234567890_1", 0, LID_SERVER);
        let addr = resolve_address(AddressInput::Jid(&jid)).unwrap();
        assert_eq!(addr.name, "1234567890_1");
    }

    #[test]
    fn resolve_address_non_lid_unchanged() {
        let jid = Jid::with_device("1234567890", 2, DEFAULT_USER_SERVER);
        let addr = resolve_address(AddressInput::Jid(&jid)).unwrap();
        assert_eq!(addr.name, "1234567890");
        assert_eq!(addr.device_id, 2);
    }

    #[test]
    fn resolve_address_raw_colon_form() {
        let addr = resolve_address(AddressInput::Raw("555:2@s.whatsapp.net")).unwrap();
        assert_eq!(addr, SignalAddress::new("555", 2));
    }

    #[test]
    fn resolve_address_raw_no_device() {
        let addr = resolve_address(AddressInput::Raw("555@lid")).unwrap();
        assert_eq!(addr, SignalAddress::new("555_1", 0));
    }
}
