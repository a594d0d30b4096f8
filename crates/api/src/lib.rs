//! HTTP surface of the merchant portal: session endpoints, the access gate
//! and the page guards.

pub mod app;
pub mod context;
pub mod middleware;
pub mod pages;
