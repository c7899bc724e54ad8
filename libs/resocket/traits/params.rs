use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use tracing::warn;
use url::Url;

/// Parameters resolved by the auth step, e.g. `{"token": "..."}`
pub type Params = serde_json::Map<String, Value>;

/// Retry counters handed to hooks so they can vary their behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryInfo {
    /// `params_retry_count + connection_retry_count`
    pub retry_count: u32,
    pub params_retry_count: u32,
    pub connection_retry_count: u32,
}

/// Trait for resolving connection parameters before each connection attempt
///
/// Called on every entry to the `auth` state (first connect and every
/// reconnect). The result parameterizes the connection URL.
///
/// # Example
/// ```ignore
/// struct TokenParams {
///     api: ApiClient,
/// }
///
/// #[async_trait::async_trait]
/// impl ParamsProvider for TokenParams {
///     async fn params(&self, info: RetryInfo) -> Result<Params> {
///         if info.params_retry_count > 5 {
///             return Err(ReSocketError::stop_retry("auth service unavailable"));
///         }
///         let token = self.api.fetch_token().await?;
///         let mut params = Params::new();
///         params.insert("token".into(), token.into());
///         Ok(params)
///     }
/// }
/// ```
#[async_trait]
pub trait ParamsProvider: Send + Sync {
    /// Resolve the params for the next connection attempt
    ///
    /// # Returns
    /// * `Ok(params)` - Proceed to `connection` with these params
    /// * `Err(ReSocketError::StopRetry(_))` - Give up, session moves to `failed`
    /// * `Err(_)` - Retry after backoff
    async fn params(&self, info: RetryInfo) -> Result<Params>;
}

/// Adapter turning an async closure into a [`ParamsProvider`]
pub struct ParamsFn<F>(F);

/// Build a [`ParamsProvider`] from `Fn(RetryInfo) -> impl Future<Output = Result<Params>>`
pub fn params_fn<F, Fut>(f: F) -> ParamsFn<F>
where
    F: Fn(RetryInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Params>> + Send,
{
    ParamsFn(f)
}

#[async_trait]
impl<F, Fut> ParamsProvider for ParamsFn<F>
where
    F: Fn(RetryInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Params>> + Send,
{
    async fn params(&self, info: RetryInfo) -> Result<Params> {
        (self.0)(info).await
    }
}

/// Everything a [`UrlBuilder`] gets to compute the connection URL
#[derive(Debug, Clone, PartialEq)]
pub struct UrlInfo {
    pub retry_info: RetryInfo,
    /// The base URL the session was created with
    pub url: String,
    /// Params from the auth step, if a params provider is configured
    pub params: Option<Params>,
}

/// Trait for computing the URL of each connection attempt
pub trait UrlBuilder: Send + Sync {
    fn build_url(&self, info: UrlInfo) -> String;
}

impl<F> UrlBuilder for F
where
    F: Fn(UrlInfo) -> String + Send + Sync,
{
    fn build_url(&self, info: UrlInfo) -> String {
        self(info)
    }
}

/// URL used when no [`UrlBuilder`] is configured
///
/// Params are appended to the query string of `base`. Null values are
/// skipped, strings are used verbatim, everything else is rendered as JSON.
/// A base that does not parse as a URL is returned unchanged, so the
/// transport reports it.
pub fn default_url(base: &str, params: Option<&Params>) -> String {
    let Some(params) = params else {
        return base.to_string();
    };

    let pairs: Vec<(&str, String)> = params
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key.as_str(), s.clone())),
            other => Some((key.as_str(), other.to_string())),
        })
        .collect();

    if pairs.is_empty() {
        return base.to_string();
    }

    let mut url = match Url::parse(base) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot append params to {}: {}", base, e);
            return base.to_string();
        }
    };
    url.query_pairs_mut().extend_pairs(pairs);
    url.into()
}
