pub mod fetch_service;
pub mod reconcile_service;
pub mod product_service;

pub use fetch_service::{ CardFetcher, Observation, ProductFetcher };
pub use reconcile_service::ReconcileService;
pub use product_service::ProductService;
