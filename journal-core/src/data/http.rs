//! Shared blocking HTTP client for the network adapters.
//!
//! Owns the provider's retry loop with exponential backoff and its circuit
//! breaker. Error messages never carry the request URL, which holds API keys.

use super::circuit_breaker::CircuitBreaker;
use super::source::SourceError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Transport settings shared by every network adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub breaker_cooldown: Duration,
    pub breaker_threshold: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            breaker_cooldown: Duration::from_secs(30 * 60),
            breaker_threshold: 3,
        }
    }
}

pub struct HttpFetcher {
    provider: String,
    client: reqwest::blocking::Client,
    breaker: CircuitBreaker,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new(provider: &str, settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            provider: provider.to_string(),
            client,
            breaker: CircuitBreaker::new(
                provider,
                settings.breaker_cooldown,
                settings.breaker_threshold,
            ),
            max_retries: settings.max_retries,
            base_delay: settings.retry_base_delay,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }

    fn tripped(&self) -> SourceError {
        SourceError::CircuitBreakerTripped {
            provider: self.provider.clone(),
        }
    }

    /// GET `url` with `query` and decode the JSON body, retrying transient
    /// failures (connect/timeout, 429, 5xx) up to `max_retries` times.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        if !self.breaker.is_allowed() {
            return Err(self.tripped());
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            if !self.breaker.is_allowed() {
                return Err(self.tripped());
            }

            match self.client.get(url).query(query).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.breaker.trip();
                        return Err(self.tripped());
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(SourceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(SourceError::AuthenticationRejected {
                            provider: self.provider.clone(),
                        });
                    }

                    if status.is_server_error() {
                        self.breaker.record_failure();
                        last_error = Some(SourceError::Http {
                            provider: self.provider.clone(),
                            status: status.as_u16(),
                        });
                        continue;
                    }

                    if !status.is_success() {
                        // 4xx other than the above: the request itself is wrong; no retry
                        return Err(SourceError::Http {
                            provider: self.provider.clone(),
                            status: status.as_u16(),
                        });
                    }

                    let body: T = resp.json().map_err(|e| {
                        SourceError::ResponseFormatChanged(format!(
                            "{}: {}",
                            self.provider,
                            e.without_url()
                        ))
                    })?;
                    self.breaker.record_success();
                    return Ok(body);
                }
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout();
                    let err = SourceError::NetworkUnreachable(e.without_url().to_string());
                    if transient {
                        self.breaker.record_failure();
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_settings() {
        let f = HttpFetcher::new("yahoo", &HttpSettings::default()).unwrap();
        assert_eq!(f.provider(), "yahoo");
        assert!(f.is_available());
    }
}
