//! Type-state markers for [`ReSocketBuilder`](super::ReSocketBuilder)
//!
//! The base URL is the only required setting, so it is the only tracked
//! state: `build()` exists only on `ReSocketBuilder<HasUrl>`.

/// Whether the base URL has been provided
pub trait UrlState {}

/// Builder without a base URL
#[derive(Debug, Clone, Copy)]
pub struct NoUrl;
impl UrlState for NoUrl {}

/// Builder with a base URL, ready to build
#[derive(Debug, Clone, Copy)]
pub struct HasUrl;
impl UrlState for HasUrl {}
