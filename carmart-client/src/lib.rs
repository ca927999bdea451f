mod comment;
pub use comment::{build_tree, CommentThread, CommentWithReplies};

pub mod currency;
pub use currency::ConversionTable;

mod i18n;
pub use i18n::Localized;

pub mod locale;
pub use locale::{Country, CountrySource, LocaleInputs, LocaleResolver};

pub mod search;
pub use search::SearchError;

mod submit;
pub use submit::{storage_path, submit_listing, SubmitError, Submitted};

pub mod wizard;
pub use wizard::{SellWizard, ValidationIssue, WizardError, WizardStep};

pub mod api {
    pub use carmart_api::*;
}
