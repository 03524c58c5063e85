pub mod audit;
pub mod auth;
pub mod authorization;
pub mod authorization_code;
pub mod consent;
pub mod email;
pub mod group;
pub mod oauth_client;
pub mod organization;
pub mod password;
pub mod password_reset;
pub mod registration;
pub mod scope;
pub mod token;
pub mod token_store;
pub mod two_factor;
