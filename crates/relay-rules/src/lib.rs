//! Proxy rewrite rule compiler for Relay.
//!
//! Compiles proxy mappings (a local path pattern forwarded to a remote
//! target) into web server rewrite directives and merges them into a site's
//! rule configuration without corrupting what is already there.
//!
//! # Architecture
//!
//! - [`mapping`]: [`ProxyMapping`] model and [`validate`]
//! - [`render`]: deterministic [`RuleBlock`] rendering per [`RoutingMode`]
//! - [`merge`]: splice before the terminal directive, marker replacement
//! - [`select_mode`]: routing mode from the permalink structure
//! - [`ControlFile`]: default-mode writes with writability checks
//! - [`RuleCompiler`]: validate once, render and merge for either mode
//! - [`ProxyInjector`]: install lifecycle over an option store and a
//!   [`RuleSetStore`]
//!
//! # Example
//!
//! ```
//! use relay_rules::{ProxyMapping, RoutingMode, RuleCompiler, RulesOptions};
//!
//! let compiler = RuleCompiler::new(
//!     vec![ProxyMapping::proxy("i/(acme)(/.*)?", "http://svc.example/i/$1$2")],
//!     RulesOptions::default(),
//! )?;
//!
//! let merged = compiler.merge_custom("RewriteRule ^index.php$ - [L]\n")?;
//! assert_eq!(
//!     merged,
//!     "RewriteRule ^i/(acme)(/.*)?$ http://svc.example/i/$1$2 [P]\n\
//!      RewriteRule ^index.php$ - [L]\n"
//! );
//! # Ok::<(), relay_rules::RuleError>(())
//! ```

mod compiler;
mod control_file;
mod error;
mod injector;
pub mod mapping;
pub mod merge;
mod mode;
mod preset;
pub mod render;
mod store;

pub use compiler::{
    DEFAULT_TERMINAL_DIRECTIVE, RuleCompiler, RulesOptions, UNESCAPED_TERMINAL_DIRECTIVE,
};
pub use control_file::{ControlFile, WriteOutcome};
pub use error::RuleError;
pub use injector::{
    InjectOutcome, InjectionState, MappingProvider, ProxyInjector, SettingsPatch, SkipReason,
};
pub use mapping::{ProxyMapping, RuleFlag, validate};
pub use mode::{RoutingMode, select_mode};
pub use preset::{DEFAULT_FORUM_SERVER, ForumPreset};
pub use render::{RuleBlock, render};
pub use store::{FileRuleSet, MemoryRuleSet, RuleSetStore};
