pub mod edge;
pub mod image;
pub mod route;
pub mod tables;

pub use edge::{CacheStatus, EdgeProxy, ProxyResponse};
pub use image::ImageProxy;
pub use route::ApiRoute;
pub use tables::TableBoard;
