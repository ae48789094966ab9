//! The request executor.
//!
//! Drives a [`Request`] to completion on a [`Client`]: composes the
//! wire-form request, runs the loader through the stub shim, evaluates
//! the validator chain, honors retry strategies within the per-request
//! budget, executes alternate requests between attempts, and notifies the
//! delegate at each lifecycle point.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelHandle;
use crate::client::Client;
use crate::delegate::AuthChallenge;
use crate::error::Error;
use crate::loader::TransferOptions;
use crate::request::{template, Request, Target};
use crate::response::Response;
use crate::retry::RetryStrategy;
use crate::transport::WireRequest;
use crate::validate::{run_chain, ChainResult};

/// Compose the wire-form request: resolve the URL, merge headers (request
/// wins over client defaults), encode the body, inject cookies, and apply
/// the user mutator last.
pub(crate) fn compose(client: &Client, request: &Request) -> Result<WireRequest, Error> {
    let mut url = match &request.target {
        Target::Absolute(raw) => {
            Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?
        }
        Target::Relative { path, vars } => {
            let base = client.base_url().ok_or_else(|| {
                Error::InvalidUrl(format!("relative path {path:?} without a client base URL"))
            })?;
            let expanded = template::expand(path, vars)?;
            base.join(&expanded)
                .map_err(|e| Error::InvalidUrl(format!("{path:?} against {base}: {e}")))?
        }
    };

    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.query {
            pairs.append_pair(name, value);
        }
        drop(pairs);
    }

    let mut headers = client.default_headers();
    headers.merge(&request.headers);

    let encoded = request.body.encode()?;
    if let Some(content_type) = &encoded.content_type {
        if !headers.contains("content-type") {
            headers.set("Content-Type", content_type.clone());
        }
    }
    if let Some(length) = encoded.content_length {
        if length > 0 && !headers.contains("content-length") {
            headers.set("Content-Length", length.to_string());
        }
    }

    if client.config().http_should_set_cookies && !headers.contains("cookie") {
        let jar = client.cookie_jar();
        let header = jar
            .lock()
            .expect("cookie jar lock poisoned")
            .header_for(&url);
        if let Some(header) = header {
            headers.set("Cookie", header);
        }
    }

    let mut wire = WireRequest {
        method: request.method.clone(),
        url,
        headers,
        body: encoded.payload,
        timeout: request.timeout.or(client.config().timeout),
    };

    if let Some(mutator) = &request.mutator {
        mutator(&mut wire);
    }

    Ok(wire)
}

/// Run a request to completion. See [`Client::fetch`] for the contract.
pub(crate) fn execute<'a>(
    client: &'a Client,
    request: Request,
) -> BoxFuture<'a, Result<Response, Error>> {
    Box::pin(execute_inner(client, request))
}

async fn execute_inner(client: &Client, mut request: Request) -> Result<Response, Error> {
    let delegate = client.delegate().clone();
    delegate.did_enqueue(&request);

    let max_retries = request.max_retries.unwrap_or(client.config().max_retries);
    let mut retries_used: u32 = 0;

    loop {
        // Retries re-read the request's mutable fields, so an `After`
        // callback mutation lands on the next wire request.
        let wire = compose(client, &request)?;
        let original_wire = wire.clone();

        let options = TransferOptions {
            mode: request.transfer_mode,
            redirect_policy: request
                .redirect_policy
                .unwrap_or(client.config().redirect_policy),
            resume: request.resume_from.as_ref(),
            progress: request.progress.as_ref(),
            cancel: request.cancel.as_ref(),
            request_id: request.id,
        };
        let output = client.loader().fetch(wire, options, &delegate).await?;
        // Resume state is consumed by the first attempt only.
        request.resume_from = None;

        let mut response = Response::new(
            output.status,
            output.headers,
            output.data,
            output.file,
            output.metrics,
            original_wire,
            output.final_request,
            retries_used,
            request.id,
        );
        response.error = output.error;

        if matches!(response.status(), 401 | 407) {
            let scheme = response
                .headers()
                .value("www-authenticate")
                .or_else(|| response.headers().value("proxy-authenticate"))
                .map(str::to_string);
            delegate.did_receive_auth_challenge(
                request.id,
                &AuthChallenge {
                    status: response.status(),
                    scheme,
                },
            );
        }

        match run_chain(client.validators(), response, &request) {
            ChainResult::Deliver(response) => {
                return finish(client, &request, response);
            }
            ChainResult::Fail(mut response, error) => {
                debug!(request = request.id, %error, "validator chain failed the response");
                response.error = Some(error);
                return finish(client, &request, response);
            }
            ChainResult::Retry(mut response, strategy) => {
                retries_used += 1;
                if retries_used > max_retries {
                    warn!(
                        request = request.id,
                        max_retries, "retry budget exhausted"
                    );
                    response.error = Some(Error::RetryAttemptsReached);
                    return finish(client, &request, response);
                }

                let delay = strategy.delay_for(retries_used);
                delegate.will_retry(request.id, &strategy, &response);

                if let RetryStrategy::After {
                    request: alt,
                    on_response,
                    ..
                } = &strategy
                {
                    debug!(request = request.id, "executing alternate request before retry");
                    // The nested fetch carries its own independent retry
                    // budget; the recursion is type-erased to keep the
                    // future sized.
                    let nested: BoxFuture<'_, Result<Response, Error>> =
                        execute(client, (**alt).clone());
                    match nested.await {
                        Ok(alt_response) if alt_response.error().is_none() => {
                            if let Some(hook) = on_response {
                                hook(&mut request, &alt_response);
                            }
                        }
                        Ok(alt_response) => {
                            let cause = alt_response.error().expect("checked above");
                            response.error =
                                Some(Error::Session(format!("alternate request failed: {cause}")));
                            return finish(client, &request, response);
                        }
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(error) => {
                            response.error =
                                Some(Error::Session(format!("alternate request failed: {error}")));
                            return finish(client, &request, response);
                        }
                    }
                }

                debug!(
                    request = request.id,
                    attempt = retries_used,
                    delay_ms = delay.as_millis(),
                    "retrying after delay"
                );
                sleep_cancellable(delay, request.cancel.as_ref()).await?;
            }
        }
    }
}

fn finish(client: &Client, request: &Request, response: Response) -> Result<Response, Error> {
    let delegate = client.delegate();
    delegate.did_collect_metrics(request.id, response.metrics());
    delegate.did_finish(request.id, &response);
    Ok(response)
}

/// Sleep for the retry delay, aborting promptly on cancellation.
async fn sleep_cancellable(delay: Duration, cancel: Option<&CancelHandle>) -> Result<(), Error> {
    if delay.is_zero() {
        return Ok(());
    }
    match cancel {
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        Some(handle) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                _ = handle.cancelled() => Err(Error::Cancelled),
            }
        }
    }
}
