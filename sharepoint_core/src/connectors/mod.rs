pub mod sharepoint;

pub use sharepoint::SharePointConnector;
