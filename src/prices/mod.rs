pub mod resolve;
pub mod store;

pub use resolve::{
    apply_resolutions, resolve_missing, resolve_price, LinePrompt, PricePrompt, PriceSource,
    Resolution, StoreLookup,
};
pub use store::{PriceRecord, PriceStore};
