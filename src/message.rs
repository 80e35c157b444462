use regex::Regex;

use crate::error::Error;

/// One line as handed over by the connection, split into its parts.
#[derive(Debug, PartialEq, Clone)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

const LINE_PATTERN: &str = r"^(?::(\S+) +)?([A-Za-z]+|[0-9]{3})(?: +(.*))?$";

impl TryFrom<&str> for IrcMessage {
    type Error = Error;

    fn try_from(value: &str) -> Result<IrcMessage, Error> {
        let value = value.trim_end_matches(['\r', '\n']);
        let re = Regex::new(LINE_PATTERN)?;

        let Some(caps) = re.captures(value) else {
            return Err(Error::NoMatch(value.to_string()));
        };

        let prefix = caps.get(1).map(|m| m.as_str().to_string());

        let Some(command) = caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) else {
            return Err(Error::NoCommand(value.to_string()));
        };

        let params = match caps.get(3).map(|m| m.as_str()) {
            None => vec![],
            Some(params) => {
                let (middle, trailing) = match params.strip_prefix(':') {
                    Some(trailing) => ("", Some(trailing)),
                    None => match params.split_once(" :") {
                        Some((middle, trailing)) => (middle, Some(trailing)),
                        None => (params, None),
                    },
                };

                middle
                    .split(' ')
                    .filter(|p| !p.is_empty())
                    .chain(trailing)
                    .map(|p| p.to_string())
                    .collect()
            }
        };

        Ok(IrcMessage {
            prefix,
            command,
            params,
        })
    }
}
