//! Raw HTTP verb commands over the request pipeline

use colored::Colorize;
use futures::StreamExt;
use serde_json::Value;

use apspace::client::CachingStrategy;
use apspace::error::{Error, Result};

use crate::cli::{CommandContext, GlobalOptions, OutputFormat, RequestArgs};
use crate::output::{print_value, spinner};

/// GET an endpoint. With cache-update-refresh every emitted value is
/// printed in order, cached first.
pub async fn get(
    opts: &GlobalOptions,
    endpoint: &str,
    refresh: bool,
    caching: Option<CachingStrategy>,
    request: &RequestArgs,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let mut options = request.options().refresh(refresh);
    if let Some(strategy) = caching {
        options = options.caching(strategy);
    }

    let offline = ctx.is_offline() && !refresh;
    let progress = spinner(&format!("GET {}", endpoint));
    let mut stream = ctx.api.get_stream(endpoint, options);
    let mut emitted = 0;

    while let Some(item) = stream.next().await {
        let value = match item {
            Ok(value) => value,
            Err(e) => {
                progress.finish_and_clear();
                return Err(e.into());
            }
        };
        progress.suspend(|| print_value(&value, ctx.format, offline))?;
        emitted += 1;
    }
    progress.finish_and_clear();

    if emitted == 0 {
        if ctx.format == OutputFormat::Json {
            print_value(&Value::Null, ctx.format, offline)?;
        } else {
            eprintln!(
                "{} Offline and nothing stored for {}",
                "⚠".yellow(),
                endpoint
            );
        }
    }
    Ok(())
}

/// POST, PUT or DELETE an endpoint
pub async fn mutate(
    opts: &GlobalOptions,
    method: reqwest::Method,
    endpoint: &str,
    body: Option<&str>,
    request: &RequestArgs,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let options = request.options();
    let body = parse_body(body)?;

    let progress = spinner(&format!("{} {}", method, endpoint));
    let result = match method {
        reqwest::Method::POST => ctx.api.post(endpoint, body, options).await,
        reqwest::Method::PUT => ctx.api.put(endpoint, body, options).await,
        reqwest::Method::DELETE => ctx.api.delete(endpoint, options).await,
        other => {
            progress.finish_and_clear();
            return Err(Error::Other(format!("unsupported method {}", other)));
        }
    };
    progress.finish_and_clear();

    print_value(&result?, ctx.format, false)
}

/// JSON body from the command line; absent means an empty object
fn parse_body(body: Option<&str>) -> Result<Value> {
    match body {
        Some(text) => Ok(serde_json::from_str(text)?),
        None => Ok(Value::Object(Default::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(Some(r#"{"otp":"123"}"#)).unwrap(), json!({"otp": "123"}));
        assert_eq!(parse_body(None).unwrap(), json!({}));
        assert!(matches!(parse_body(Some("{nope")), Err(Error::Json(_))));
    }
}
