//! Configuration loading for the fixgate gateway.
//!
//! Config files are discovered in `./` and then `~/.config/fixgate/`, in
//! TOML, YAML or JSON, with `${VAR}` placeholders expanded from the
//! environment before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{clear_config_dir, config_dir, discover_and_load, load_config, set_config_dir},
    schema::{
        FixgateConfig, GatewayConfig, LibraryEntry, MAX_ATTACHED_LIBRARIES, RetentionPolicy,
    },
    validate::{ConfigIssue, validate},
};
