//! Builds and starts the `loclx` tunnel process.

use std::io::{self, PipeReader};
use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// Environment variable the token is read from and forwarded under.
pub const TOKEN_ENV: &str = "LOCALXPOSE_ACCESS_TOKEN";
/// Name newer `loclx` releases read the token from.
pub const TOKEN_ENV_COMPAT: &str = "ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("LOCALXPOSE_ACCESS_TOKEN is not set")]
    MissingToken,
    #[error("Failed to open output pipe for localxpose: {0}")]
    Pipe(#[source] io::Error),
    #[error("Failed to start localxpose: {0}")]
    Spawn(#[source] io::Error),
}

impl LaunchError {
    /// Whether the failure happened after a start was attempted.
    pub fn attempted_start(&self) -> bool {
        !matches!(self, LaunchError::MissingToken)
    }
}

/// Everything needed to start one tunnel process.
///
/// Optional settings that are empty strings are treated as unset, matching
/// how container environments blank out variables.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub binary: String,
    pub access_token: Option<String>,
    pub to: String,
    pub region: Option<String>,
    pub port: Option<String>,
    pub reserved_endpoint: Option<String>,
}

impl LaunchConfig {
    pub fn token(&self) -> Result<&str, LaunchError> {
        non_empty(&self.access_token).ok_or(LaunchError::MissingToken)
    }

    /// Arguments passed after the binary name.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["tunnel", "--raw-mode", "udp", "--to", self.to.as_str()]
            .into_iter()
            .map(String::from)
            .collect();

        let optional = [
            ("--region", &self.region),
            ("--port", &self.port),
            ("--reserved-endpoint", &self.reserved_endpoint),
        ];
        for (flag, value) in optional {
            if let Some(value) = non_empty(value) {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        }

        args
    }

    fn command(&self, token: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args())
            .env(TOKEN_ENV, token)
            .env(TOKEN_ENV_COMPAT, token)
            .stdin(Stdio::null());
        cmd
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A started tunnel process and the read end of its merged stdout/stderr.
pub struct Launched {
    pub child: Child,
    pub output: PipeReader,
}

/// Starts exactly one tunnel process. No retries.
pub fn launch(config: &LaunchConfig) -> Result<Launched, LaunchError> {
    let token = config.token()?;

    let (output, writer) = io::pipe().map_err(LaunchError::Pipe)?;
    let stderr = writer.try_clone().map_err(LaunchError::Pipe)?;

    // The command owns the write ends; it must be dropped after spawning so
    // the reader sees EOF once the child exits.
    let child = {
        let mut cmd = config.command(token);
        cmd.stdout(writer).stderr(stderr);
        cmd.spawn().map_err(LaunchError::Spawn)?
    };

    Ok(Launched { child, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn config() -> LaunchConfig {
        LaunchConfig {
            binary: "loclx".to_string(),
            access_token: Some("secret".to_string()),
            to: "unvanq-server:27960".to_string(),
            region: None,
            port: None,
            reserved_endpoint: None,
        }
    }

    #[test]
    fn base_arguments() {
        assert_eq!(
            config().args(),
            vec!["tunnel", "--raw-mode", "udp", "--to", "unvanq-server:27960"]
        );
    }

    #[test]
    fn optional_flags_follow_destination() {
        let config = LaunchConfig {
            region: Some("eu".to_string()),
            port: Some("27960".to_string()),
            reserved_endpoint: Some("game.loclx.io".to_string()),
            ..config()
        };
        assert_eq!(
            config.args(),
            vec![
                "tunnel",
                "--raw-mode",
                "udp",
                "--to",
                "unvanq-server:27960",
                "--region",
                "eu",
                "--port",
                "27960",
                "--reserved-endpoint",
                "game.loclx.io",
            ]
        );
    }

    #[test]
    fn empty_optional_values_are_skipped() {
        let config = LaunchConfig {
            region: Some(String::new()),
            port: Some("4000".to_string()),
            ..config()
        };
        let args = config.args();
        assert!(!args.iter().any(|a| a == "--region"));
        assert!(args.ends_with(&["--port".to_string(), "4000".to_string()]));
    }

    #[test]
    fn token_is_forwarded_under_both_names() {
        let cmd = config().command("secret");
        let envs: Vec<_> = cmd
            .get_envs()
            .map(|(k, v)| (k.to_owned(), v.map(|v| v.to_owned())))
            .collect();
        for name in [TOKEN_ENV, TOKEN_ENV_COMPAT] {
            assert!(
                envs.iter()
                    .any(|(k, v)| k == name && v.as_deref() == Some(OsStr::new("secret"))),
                "{name} missing from child environment"
            );
        }
    }

    #[test]
    fn missing_or_empty_token_is_rejected() {
        let missing = LaunchConfig {
            access_token: None,
            ..config()
        };
        let empty = LaunchConfig {
            access_token: Some(String::new()),
            ..config()
        };

        for config in [missing, empty] {
            let err = launch(&config).err().expect("launch must fail");
            assert!(matches!(err, LaunchError::MissingToken));
            assert!(!err.attempted_start());
            assert_eq!(err.to_string(), "LOCALXPOSE_ACCESS_TOKEN is not set");
        }
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let config = LaunchConfig {
            binary: "/nonexistent/loclx".to_string(),
            ..config()
        };
        let err = launch(&config).err().expect("launch must fail");
        assert!(matches!(err, LaunchError::Spawn(_)));
        assert!(err.attempted_start());
        assert!(err.to_string().starts_with("Failed to start localxpose"));
    }
}
