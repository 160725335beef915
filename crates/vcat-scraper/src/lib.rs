pub mod client;
pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod scan;
pub mod session;

pub use client::{domain_of, PageClient};
pub use error::ScrapeError;
pub use extract::{
    detect_login_form, extract_product, extract_product_links, ExtractionRules, LoginForm,
};
pub use rate_limit::DomainLimiter;
pub use scan::{flatten_product_urls, NavNode, NodeKind, StructureScanner};
pub use session::{AuthMode, Credentials, Session};
