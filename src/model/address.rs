//! Email address parsing (RFC 5322 §3.4) and the address shapes passed
//! between the transport and the extracted message.

/// Placeholder mailbox used by `To: undisclosed-recipients:;` style groups.
pub const UNDISCLOSED_RECIPIENTS: &str = "undisclosed-recipients";

/// A parsed header address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty, may still be RFC 2047 encoded).
    pub display_name: String,
    /// The bare email address (`user@domain`), or the raw token if unparseable.
    pub address: String,
}

impl EmailAddress {
    /// Parse a single email address from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// If parsing fails, the raw string is stored as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self {
                display_name: String::new(),
                address: String::new(),
            };
        }

        if let Some(angle_start) = trimmed.rfind('<') {
            if let Some(angle_end) = trimmed.rfind('>') {
                if angle_end > angle_start {
                    let addr = trimmed[angle_start + 1..angle_end].trim().to_string();
                    let name_part = trimmed[..angle_start].trim();
                    return Self {
                        display_name: strip_quotes(name_part),
                        address: addr,
                    };
                }
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas: `"Last, First" <a@b.com>, other@c.com`
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ',' if !in_quotes && !in_angle => {
                    let addr = Self::parse(&current);
                    if !addr.address.is_empty() {
                        results.push(addr);
                    }
                    current.clear();
                }
                _ => current.push(ch),
            }
        }

        let addr = Self::parse(&current);
        if !addr.address.is_empty() {
            results.push(addr);
        }

        results
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One address as the transport reports it: split into mailbox and host,
/// with the personal name still in its raw (possibly encoded) form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MailboxAddress {
    pub mailbox: String,
    pub host: String,
    pub personal: Option<String>,
}

impl MailboxAddress {
    /// Split a parsed header address into mailbox/host.
    ///
    /// Group syntax such as `undisclosed-recipients:;` has no `@` and yields
    /// the group name as mailbox with an empty host.
    pub fn from_email(addr: &EmailAddress) -> Self {
        let (mailbox, host) = match addr.address.rfind('@') {
            Some(at) => (
                addr.address[..at].to_string(),
                addr.address[at + 1..].to_string(),
            ),
            None => (
                addr.address
                    .trim_end_matches(';')
                    .trim_end_matches(':')
                    .trim()
                    .to_string(),
                String::new(),
            ),
        };
        let personal = if addr.display_name.is_empty() {
            None
        } else {
            Some(addr.display_name.clone())
        };
        Self {
            mailbox,
            host,
            personal,
        }
    }

    /// Parse a whole address header into transport-shaped entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        EmailAddress::parse_list(raw)
            .iter()
            .map(Self::from_email)
            .collect()
    }

    /// `mailbox@host`, or the bare mailbox when there is no host.
    pub fn full_address(&self) -> String {
        if self.host.is_empty() {
            self.mailbox.clone()
        } else {
            format!("{}@{}", self.mailbox, self.host)
        }
    }

    pub fn is_undisclosed_placeholder(&self) -> bool {
        self.mailbox.eq_ignore_ascii_case(UNDISCLOSED_RECIPIENTS)
    }
}

/// A decoded address as it appears in an extracted message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AddressEntry {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("user@example.com");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("User One <user1@example.com>");
        assert_eq!(addr.address, "user1@example.com");
        assert_eq!(addr.display_name, "User One");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Last, First\" <user@example.com>");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "Last, First");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = EmailAddress::parse_list("\"Last, First\" <a@b.com>, other@c.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Last, First");
        assert_eq!(list[1].address, "other@c.com");
    }

    #[test]
    fn test_mailbox_split() {
        let list = MailboxAddress::parse_list("Alice <alice@example.com>, bob@example.org");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].mailbox, "alice");
        assert_eq!(list[0].host, "example.com");
        assert_eq!(list[0].personal.as_deref(), Some("Alice"));
        assert_eq!(list[1].full_address(), "bob@example.org");
        assert_eq!(list[1].personal, None);
    }

    #[test]
    fn test_undisclosed_group() {
        let list = MailboxAddress::parse_list("undisclosed-recipients:;");
        assert_eq!(list.len(), 1);
        assert!(list[0].is_undisclosed_placeholder());
        assert_eq!(list[0].host, "");
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress {
            display_name: "Alice".to_string(),
            address: "alice@example.com".to_string(),
        };
        assert_eq!(addr.display(), "Alice <alice@example.com>");
    }
}
