mod provider;
pub mod search;

pub use provider::Provider;
pub use search::EarthSearch;
