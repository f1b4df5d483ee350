//! Reference widgets built on the controller core.
//!
//! These are consumers of the public contract: they use refs, state, the
//! event bridge, and reload exactly the way application widgets would.

pub mod form;
pub mod form_input;
pub mod search_bucket;

pub use form::FormController;
pub use form_input::FormInputController;
pub use search_bucket::SearchBucketController;

use crate::upgrade::UpgradeTable;

/// The stock selector table wiring the bundled widgets, mirroring a typical
/// site bootstrap.
pub fn standard_table() -> UpgradeTable {
    UpgradeTable::new()
        .register::<FormController>(".js-form")
        .register::<FormInputController>(".js-form-input")
        .register::<SearchBucketController>(".js-search-bucket")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_registers_the_bundled_widgets() {
        assert_eq!(standard_table().len(), 3);
    }
}
