//! Progressive enhancement for server-rendered markup.
//!
//! The server emits plain HTML; this crate "upgrades" matching elements into
//! interactive widgets. Each widget is a [`Controller`] bound to one element,
//! holding an immutable state snapshot and re-rendering itself on every
//! state change. Controllers communicate upward through a synthetic
//! event-bubbling protocol and can atomically swap their subtree for fresh
//! server markup, handing over to a new controller instance ("reload").
//!
//! A page is wired up once at boot:
//!
//! ```
//! use uplift::{Document, EnvFlags, Upgrader};
//! use uplift::controllers::standard_table;
//!
//! let doc = Document::parse(
//!     r#"<div class="js-search-bucket">
//!         <h2 data-ref="header">3 results</h2>
//!         <ol data-ref="content"></ol>
//!     </div>"#,
//! )
//! .unwrap();
//!
//! let flags = EnvFlags::new();
//! let upgrader = Upgrader::with_env_flags(standard_table(), flags.clone());
//! upgrader.run(&doc.body()).unwrap();
//! assert!(flags.is_ready());
//! ```

pub mod controller;
pub mod controllers;
pub mod dom;
pub mod env;
pub mod error;
pub mod registry;
pub mod upgrade;
pub mod util;

pub use controller::events::{Event, TriggerArg, dispatch};
pub use controller::refs::{REF_ATTRIBUTE, find_refs};
pub use controller::state::{State, StateChanges, Value};
pub use controller::{Controller, ControllerBase, Options, ReloadFn};
pub use dom::{Document, Element, NodeId, Selector};
pub use env::EnvFlags;
pub use error::{Error, Result};
pub use registry::{ControllerHandle, ControllerId, ControllerRegistry};
pub use upgrade::{UpgradeTable, Upgrader};
