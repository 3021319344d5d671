use log::{debug, info, warn};

use super::{
    adapter::QueryAdapter,
    context::{RequestContext, State},
    lifetime::CallerGuard,
};
use crate::{
    dns::message::RecordType,
    host::Host,
    metrics::{self, Outcome},
};

/// Drives one request to a terminal state, delivers its result and releases
/// the caller. Consumes both, so each request is dispatched once.
pub async fn run(
    adapter: &dyn QueryAdapter,
    host: &dyn Host,
    context: RequestContext,
    guard: CallerGuard,
) {
    let context = resolve(adapter, context).await;
    dispatch(host, context, guard);
}

pub async fn resolve(adapter: &dyn QueryAdapter, mut context: RequestContext) -> RequestContext {
    match adapter.query(context.query_host(), RecordType::A).await {
        Err(err) => context.failed(format!("{:#}", err)),
        Ok(answers) => match answers.into_iter().next() {
            None => context.not_listed(),
            Some(first) => {
                context.listed(first.data);
                match adapter.query(context.query_host(), RecordType::Txt).await {
                    Err(err) => context.failed(format!("{:#}", err)),
                    Ok(answers) => context.explained(
                        answers
                            .into_iter()
                            .next()
                            .map(|r| r.data)
                            .unwrap_or_default(),
                    ),
                }
            }
        },
    }
    context
}

fn dispatch(host: &dyn Host, context: RequestContext, guard: CallerGuard) {
    let outcome = match context.state() {
        State::Listed => {
            info!("{} is listed ({})", context.query_host(), context.event());
            Outcome::Listed
        }
        State::NotListed => {
            debug!("{} is not listed ({})", context.query_host(), context.event());
            Outcome::NotListed
        }
        State::Failed => Outcome::Error,
        State::AwaitingA | State::AwaitingTxt => {
            unreachable!("dispatch before a terminal state")
        }
    };
    metrics::record(outcome);
    let endpoint = guard.endpoint();
    let result = context.into_result();
    if let Some(error) = &result.error {
        warn!("Lookup of {} in {} failed: {}", result.address, result.zone, error);
    }
    host.deliver(endpoint, result);
    drop(guard);
}
