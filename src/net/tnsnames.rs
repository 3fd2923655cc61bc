//! Endpoint resolution
//!
//! An endpoint is either written out directly (`[tcps://]host[:port][/service]`),
//! given as a parenthesized connect descriptor, or named by an alias
//! defined in the wallet's `tnsnames.ora`.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Network configuration file shipped inside cloud wallets
pub const TNSNAMES_FILE: &str = "tnsnames.ora";

/// Port used when an endpoint does not name one
pub const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    /// TCP wrapped in TLS
    Tcps,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub service: Option<String>,
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn requires_tls(&self) -> bool {
        self.protocol == Protocol::Tcps
    }

    /// Parse the direct `[tcp://|tcps://]host[:port][/service]` form
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (protocol, rest) = if let Some(rest) = input.strip_prefix("tcps://") {
            (Protocol::Tcps, rest)
        } else if let Some(rest) = input.strip_prefix("tcp://") {
            (Protocol::Tcp, rest)
        } else {
            (Protocol::Tcp, input)
        };

        let (address, service) = match rest.split_once('/') {
            Some((address, service)) if !service.is_empty() => (address, Some(service.to_string())),
            Some((address, _)) => (address, None),
            None => (rest, None),
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidInput(format!("Invalid port in endpoint '{}'", input)))?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(Error::InvalidInput(format!("Missing host in endpoint '{}'", input)));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            service,
            protocol,
        })
    }

    /// Extract the first address and service name from a connect descriptor
    pub fn from_descriptor(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        let root = cursor.parse_param()?;

        let address = root
            .find("ADDRESS")
            .ok_or_else(|| Error::InvalidInput("Connect descriptor has no ADDRESS".to_string()))?;
        let host = address
            .value_of("HOST")
            .ok_or_else(|| Error::InvalidInput("Connect descriptor has no HOST".to_string()))?;
        let port = match address.value_of("PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| Error::InvalidInput(format!("Invalid PORT '{}' in connect descriptor", port)))?,
            None => DEFAULT_PORT,
        };
        let protocol = match address.value_of("PROTOCOL").map(str::to_ascii_lowercase).as_deref() {
            Some("tcps") => Protocol::Tcps,
            Some("tcp") | None => Protocol::Tcp,
            Some(other) => {
                return Err(Error::InvalidInput(format!("Unsupported PROTOCOL '{}'", other)));
            }
        };
        let service = root
            .find("CONNECT_DATA")
            .and_then(|data| data.value_of("SERVICE_NAME"))
            .map(str::to_string);

        Ok(Self {
            host: host.to_string(),
            port,
            service,
            protocol,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol == Protocol::Tcps {
            write!(f, "tcps://")?;
        }
        write!(f, "{}:{}", self.host, self.port)?;
        if let Some(service) = &self.service {
            write!(f, "/{}", service)?;
        }
        Ok(())
    }
}

/// Resolve an endpoint string, consulting `config_dir/tnsnames.ora` for aliases
pub fn resolve(endpoint: &str, config_dir: Option<&Path>) -> Result<Endpoint> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with('(') {
        return Endpoint::from_descriptor(endpoint);
    }

    if let Some(dir) = config_dir {
        let path = dir.join(TNSNAMES_FILE);
        if path.is_file() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| Error::IoFailure(format!("Cannot read {}: {}", path.display(), e)))?;
            let aliases = parse_aliases(&contents)?;
            if let Some(descriptor) = aliases.get(&endpoint.to_ascii_lowercase()) {
                return Endpoint::from_descriptor(descriptor);
            }
            if !looks_like_address(endpoint) {
                return Err(Error::InvalidInput(format!(
                    "Alias '{}' is not defined in {}",
                    endpoint,
                    path.display()
                )));
            }
        }
    }

    Endpoint::parse(endpoint)
}

fn looks_like_address(endpoint: &str) -> bool {
    endpoint.contains(['.', ':', '/']) || endpoint.eq_ignore_ascii_case("localhost")
}

/// Map of lower-cased alias to descriptor text
pub fn parse_aliases(contents: &str) -> Result<HashMap<String, String>> {
    let stripped: String = contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n");

    let mut aliases = HashMap::new();
    let mut cursor = Cursor::new(&stripped);
    loop {
        cursor.skip_whitespace();
        if cursor.at_end() {
            break;
        }
        let names = cursor.take_until('=')?;
        cursor.expect('=')?;
        cursor.skip_whitespace();
        let descriptor = cursor.take_balanced()?;
        for name in names.split(',') {
            let name = name.trim();
            if !name.is_empty() {
                aliases.insert(name.to_ascii_lowercase(), descriptor.clone());
            }
        }
    }
    Ok(aliases)
}

/// One `(KEY=VALUE)` or `(KEY=(..)(..))` node of a descriptor
#[derive(Debug)]
struct Param {
    key: String,
    value: Option<String>,
    children: Vec<Param>,
}

impl Param {
    /// Depth-first search for a node named `key`
    fn find(&self, key: &str) -> Option<&Param> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    fn value_of(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(|param| param.value.as_deref())
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(Error::InvalidInput(format!(
                "Expected '{}' but found '{}' at offset {}",
                expected, c, self.pos
            ))),
            None => Err(Error::InvalidInput(format!(
                "Expected '{}' but reached end of input",
                expected
            ))),
        }
    }

    fn take_until(&mut self, stop: char) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == stop {
                return Ok(self.chars[start..self.pos].iter().collect());
            }
            if c == '(' || c == ')' {
                break;
            }
            self.pos += 1;
        }
        Err(Error::InvalidInput(format!("Expected '{}' after offset {}", stop, start)))
    }

    /// Consume a parenthesized group including its nested groups
    fn take_balanced(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '(' => depth += 1,
                ')' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Error::InvalidInput(format!("Unbalanced ')' at offset {}", self.pos - 1))
                    })?;
                    if depth == 0 {
                        return Ok(self.chars[start..self.pos].iter().collect());
                    }
                }
                _ if depth == 0 && !c.is_whitespace() => {
                    return Err(Error::InvalidInput(format!(
                        "Expected '(' but found '{}' at offset {}",
                        c,
                        self.pos - 1
                    )));
                }
                _ => {}
            }
        }
        Err(Error::InvalidInput("Unterminated connect descriptor".to_string()))
    }

    fn parse_param(&mut self) -> Result<Param> {
        self.expect('(')?;
        let key = self.take_until('=')?.trim().to_ascii_uppercase();
        self.expect('=')?;
        self.skip_whitespace();

        let mut param = Param {
            key,
            value: None,
            children: Vec::new(),
        };

        if self.peek() == Some('(') {
            while self.peek() == Some('(') {
                param.children.push(self.parse_param()?);
                self.skip_whitespace();
            }
        } else {
            let start = self.pos;
            while self.peek().is_some_and(|c| c != ')') {
                self.pos += 1;
            }
            let value: String = self.chars[start..self.pos].iter().collect();
            param.value = Some(value.trim().to_string());
        }

        self.expect(')')?;
        Ok(param)
    }
}
