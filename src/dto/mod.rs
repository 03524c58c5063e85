pub mod auth;
pub mod oauth;
pub mod rbac;
pub mod twofa;
