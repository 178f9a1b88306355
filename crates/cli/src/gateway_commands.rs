//! Script-driven gateway runner.
//!
//! Each input line is one JSON command standing in for a call from the
//! protocol layer. Results and handler invocations are written to stdout
//! as JSON lines.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    fixgate_config::FixgateConfig,
    fixgate_gateway::{
        GatewayError, GatewayState, LibraryRef, LogoutReason, SessionExistsHandler, notifier,
    },
    fixgate_sessions::{InterestPolicy, LibraryId, PartyId, SessionKey, SurrogateId},
    serde::Deserialize,
    serde_json::{Value, json},
    tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    tracing::{debug, warn},
};

/// One scripted call into the gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Logon {
        local: PartyId,
        remote: PartyId,
    },
    Attach {
        library: LibraryId,
        #[serde(default)]
        interest: Option<InterestPolicy>,
    },
    Acquire {
        handle: SurrogateId,
        library: LibraryId,
    },
    Detach {
        library: LibraryId,
    },
    Logout {
        handle: SurrogateId,
        #[serde(default)]
        timeout: bool,
    },
    Evict {
        handle: SurrogateId,
    },
    Lookup {
        handle: SurrogateId,
    },
    Stats {
        library: LibraryId,
    },
    /// Pause the script, letting queued deliveries run.
    Sleep {
        ms: u64,
    },
}

/// Handler that writes each existence notification as a JSON line.
struct PrintHandler;

impl SessionExistsHandler for PrintHandler {
    #[allow(clippy::too_many_arguments)]
    fn on_session_exists(
        &self,
        library: &LibraryRef,
        surrogate_id: SurrogateId,
        local_comp_id: &str,
        local_sub_id: &str,
        local_location_id: &str,
        remote_comp_id: &str,
        remote_sub_id: &str,
        remote_location_id: &str,
    ) -> Result<()> {
        println!(
            "{}",
            json!({
                "event": "session_exists",
                "library": library.id,
                "library_name": &*library.name,
                "surrogate_id": surrogate_id,
                "local_comp_id": local_comp_id,
                "local_sub_id": local_sub_id,
                "local_location_id": local_location_id,
                "remote_comp_id": remote_comp_id,
                "remote_sub_id": remote_sub_id,
                "remote_location_id": remote_location_id,
            })
        );
        Ok(())
    }
}

pub async fn run(config: FixgateConfig, script: Option<PathBuf>) -> Result<()> {
    let state = GatewayState::new(config.gateway.clone());
    let handler: Arc<dyn SessionExistsHandler> = Arc::new(PrintHandler);
    for lib in &config.libraries {
        state.register_handler(lib.id, lib.display_name(), Arc::clone(&handler));
    }
    debug!(libraries = config.libraries.len(), "registered library handlers");

    let result = match script {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            drive(&state, &config, BufReader::new(file)).await
        },
        None => drive(&state, &config, BufReader::new(tokio::io::stdin())).await,
    };

    state.shutdown(Duration::from_secs(5)).await;
    result
}

/// Execute commands until input ends or a fatal gateway error occurs.
pub async fn drive<R>(state: &GatewayState, config: &FixgateConfig, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command: Command = match serde_json::from_str(trimmed) {
            Ok(c) => c,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed command");
                emit(json!({ "line": line_no, "error": format!("malformed command: {e}") }));
                continue;
            },
        };

        match execute(state, config, command).await {
            Ok(reply) => emit(reply),
            Err(e) if e.is_fatal() => {
                return Err(anyhow::Error::new(e).context(format!("fatal error at line {line_no}")));
            },
            Err(e) => emit(json!({ "line": line_no, "error": e.to_string() })),
        }
    }
    Ok(())
}

async fn execute(
    state: &GatewayState,
    config: &FixgateConfig,
    command: Command,
) -> Result<Value, GatewayError> {
    Ok(match command {
        Command::Logon { local, remote } => {
            let id = notifier::on_logon_accepted(state, SessionKey::new(local, remote)).await?;
            json!({ "op": "logon", "surrogate_id": id })
        },
        Command::Attach { library, interest } => {
            let interest = interest
                .or_else(|| config.library(library).map(|l| l.interest))
                .unwrap_or_default();
            let lib = notifier::on_library_attached(state, library, interest).await?;
            json!({ "op": "attach", "library": lib.id, "name": &*lib.name, "interest": interest })
        },
        Command::Acquire { handle, library } => {
            notifier::acquire_session(state, handle, library).await?;
            json!({ "op": "acquire", "surrogate_id": handle, "library": library })
        },
        Command::Detach { library } => {
            notifier::on_library_detached(state, library).await?;
            json!({ "op": "detach", "library": library })
        },
        Command::Logout { handle, timeout } => {
            let reason = if timeout {
                LogoutReason::Timeout
            } else {
                LogoutReason::Logout
            };
            notifier::on_logout(state, handle, reason).await?;
            json!({ "op": "logout", "surrogate_id": handle })
        },
        Command::Evict { handle } => {
            notifier::evict(state, handle).await?;
            json!({ "op": "evict", "surrogate_id": handle })
        },
        Command::Lookup { handle } => {
            let key = notifier::lookup(state, handle).await?;
            json!({ "op": "lookup", "surrogate_id": handle, "session": key })
        },
        Command::Stats { library } => {
            json!({ "op": "stats", "library": library, "stats": state.delivery_stats(library) })
        },
        Command::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            json!({ "op": "sleep", "ms": ms })
        },
    })
}

fn emit(value: Value) {
    println!("{value}");
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        fixgate_config::{GatewayConfig, LibraryEntry},
    };

    fn config(max_surrogate_id: u64) -> FixgateConfig {
        FixgateConfig {
            gateway: GatewayConfig {
                max_surrogate_id,
                ..GatewayConfig::default()
            },
            libraries: vec![LibraryEntry {
                id: LibraryId(1),
                name: Some("oms".into()),
                interest: InterestPolicy::All,
            }],
        }
    }

    #[test]
    fn parses_commands() {
        let cmd: Command = serde_json::from_str(
            r#"{"op":"logon","local":{"comp_id":"BRKR","location_id":"NY"},"remote":{"comp_id":"CLIENT","sub_id":"TRADE"}}"#,
        )
        .unwrap();
        let Command::Logon { local, remote } = cmd else {
            panic!("expected logon");
        };
        assert_eq!(
            SessionKey::new(local, remote).fields(),
            ["BRKR", "", "NY", "CLIENT", "TRADE", ""]
        );

        let cmd: Command =
            serde_json::from_str(r#"{"op":"logout","handle":3,"timeout":true}"#).unwrap();
        assert!(matches!(cmd, Command::Logout {
            handle: SurrogateId(3),
            timeout: true
        }));
    }

    #[tokio::test]
    async fn script_runs_to_completion() {
        let cfg = config(100);
        let state = GatewayState::new(cfg.gateway.clone());
        state.register_handler(LibraryId(1), "oms", Arc::new(PrintHandler));

        let script = br#"
# comment lines and blanks are skipped
{"op":"attach","library":1}
{"op":"logon","local":{"comp_id":"BRKR"},"remote":{"comp_id":"A"}}
{"op":"lookup","handle":99}
not json
{"op":"logout","handle":1}
"#;
        drive(&state, &cfg, BufReader::new(&script[..]))
            .await
            .unwrap();
        assert!(state.registry.read().await.is_empty());
        assert!(state.is_attached(LibraryId(1)).await);
    }

    #[tokio::test]
    async fn handle_exhaustion_stops_the_script() {
        let cfg = config(1);
        let state = GatewayState::new(cfg.gateway.clone());
        let script = br#"
{"op":"logon","local":{"comp_id":"BRKR"},"remote":{"comp_id":"A"}}
{"op":"logon","local":{"comp_id":"BRKR"},"remote":{"comp_id":"B"}}
{"op":"logon","local":{"comp_id":"BRKR"},"remote":{"comp_id":"C"}}
"#;
        let err = drive(&state, &cfg, BufReader::new(&script[..]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }
}
