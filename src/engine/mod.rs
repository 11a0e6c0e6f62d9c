pub mod dispatcher;
pub mod expiry;
pub mod locks;
pub mod response;
pub mod selector;
