//! Server configuration.

use clap::Parser;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// A user allowed to obtain tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub name: String,
    pub password: String,
}

impl std::str::FromStr for UserCredential {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Format: "name:password" (the password may itself contain ':')
        let (name, password) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected NAME:PASSWORD, got '{}'", s))?;
        if name.is_empty() {
            return Err("User name must not be empty".to_string());
        }
        if password.is_empty() {
            return Err(format!("Password for '{}' must not be empty", name));
        }
        Ok(UserCredential {
            name: name.to_string(),
            password: password.to_string(),
        })
    }
}

/// mole-server - Issue and check address-bound tickets for tunnel operations.
#[derive(Parser, Debug, Clone)]
#[command(name = "mole-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "MOLE_LISTEN", default_value = "0.0.0.0:9443")]
    pub listen: SocketAddr,

    /// Ticket lifetime in seconds
    #[arg(long, env = "MOLE_TICKET_LIFETIME", default_value = "1800")]
    pub ticket_lifetime: u64,

    /// User allowed to obtain tickets, as NAME:PASSWORD (repeatable).
    /// Taken verbatim, so the password may contain commas
    #[arg(long = "user", value_parser = parse_user)]
    pub users: Vec<UserCredential>,

    /// Comma separated NAME:PASSWORD list, added to --user entries.
    /// Passwords given here cannot contain commas
    #[arg(long = "users", env = "MOLE_USERS", value_delimiter = ',', value_parser = parse_user)]
    pub user_list: Vec<UserCredential>,

    /// API key for administrative endpoints (re-initialization).
    /// If not set, administrative endpoints are disabled
    #[arg(long, env = "MOLE_ADMIN_KEY")]
    pub admin_key: Option<String>,

    /// Reverse proxies whose X-Forwarded-For header is trusted (IP or CIDR, repeatable)
    #[arg(long = "trusted-proxy", env = "MOLE_TRUSTED_PROXIES", value_delimiter = ',', value_parser = parse_net)]
    pub trusted_proxies: Vec<IpNet>,

    /// Enable debug logging
    #[arg(long, env = "MOLE_DEBUG")]
    pub debug: bool,
}

fn parse_user(s: &str) -> Result<UserCredential, String> {
    s.parse()
}

fn parse_net(s: &str) -> Result<IpNet, String> {
    s.parse::<IpNet>()
        .or_else(|_| s.parse::<IpAddr>().map(IpNet::from))
        .map_err(|_| format!("Invalid IP address or CIDR: {}", s))
}

impl ServerConfig {
    /// Every configured user, list entries first so `--user` wins on a
    /// repeated name.
    pub fn all_users(&self) -> Vec<UserCredential> {
        self.user_list.iter().chain(&self.users).cloned().collect()
    }

    /// Ticket lifetime as a duration.
    pub fn ticket_lifetime(&self) -> Duration {
        Duration::from_secs(self.ticket_lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_credential_parse() {
        let user: UserCredential = "jb:hunter2".parse().unwrap();
        assert_eq!(user.name, "jb");
        assert_eq!(user.password, "hunter2");

        let colon: UserCredential = "jb:a:b".parse().unwrap();
        assert_eq!(colon.password, "a:b");

        assert!("jb".parse::<UserCredential>().is_err());
        assert!(":secret".parse::<UserCredential>().is_err());
        assert!("jb:".parse::<UserCredential>().is_err());
    }

    #[test]
    fn test_parse_net() {
        assert_eq!(parse_net("10.0.0.0/8").unwrap().to_string(), "10.0.0.0/8");
        assert_eq!(parse_net("127.0.0.1").unwrap().to_string(), "127.0.0.1/32");
        assert!(parse_net("not-an-ip").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["mole-server", "--user", "jb:pw", "--user", "ops:x"]);

        assert_eq!(config.listen.to_string(), "0.0.0.0:9443");
        assert_eq!(config.ticket_lifetime(), Duration::from_secs(1800));
        assert_eq!(config.users.len(), 2);
        assert!(config.admin_key.is_none());
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn test_user_flag_keeps_commas() {
        let config = ServerConfig::try_parse_from(["mole-server", "--user", "jb:a,b"]).unwrap();

        assert_eq!(config.all_users(), vec!["jb:a,b".parse::<UserCredential>().unwrap()]);
    }

    #[test]
    fn test_user_list_is_comma_separated() {
        let config = ServerConfig::try_parse_from([
            "mole-server",
            "--users",
            "jb:old,ops:x",
            "--user",
            "jb:new,er",
        ])
        .unwrap();

        let users = config.all_users();
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].name, "jb");
        assert_eq!(users[1].name, "ops");
        assert_eq!(users[2].password, "new,er");
    }
}
