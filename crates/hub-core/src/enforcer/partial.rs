//! Partial cross-check of account queries.
//!
//! An account query is answered by a small node set that may all be serving
//! the same stale or forged view. A sample of the winning response's
//! activities is re-fetched by ID from full nodes outside that set; a
//! secondary that returns a different version of an activity costs the
//! working node one invalid point.

use futures::future::join_all;
use tracing::{debug, warn};

use super::{identity::ResponseShape, Enforcer, EnforcerError, Outcome};
use crate::{
    fetch::FetchRequest,
    payload::{self, ActivitiesResponse, Activity, ActivityResponse, Classification},
    router::encode_segment,
    types::{DataResponse, InvalidReason, NodeClass, NodeEndpointCache},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Match,
    Mismatch,
    Inconclusive,
}

impl Enforcer {
    /// Multi-result verification followed by a cross-check of the working
    /// response against secondary full nodes.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Enforcer::verify_responses`] and from
    /// recording a mismatch. Secondary fetch failures are inconclusive.
    pub async fn verify_partial_responses(
        &self,
        request: &str,
        responses: Vec<DataResponse>,
    ) -> Result<Vec<DataResponse>, EnforcerError> {
        let responses = self.verify_responses(request, ResponseShape::Multi, responses).await?;

        let Some(working) = responses.first().filter(|r| r.valid && !r.is_err()) else {
            return Ok(responses);
        };
        let config = self.config();
        let sample: Vec<Activity> = working
            .data
            .as_deref()
            .and_then(|body| serde_json::from_slice::<ActivitiesResponse>(body).ok())
            .and_then(|parsed| parsed.data)
            .unwrap_or_default()
            .into_iter()
            .take(config.partial_sample_size)
            .collect();
        if sample.is_empty() {
            return Ok(responses);
        }

        let secondaries: Vec<NodeEndpointCache> = self
            .index
            .retrieve_qualified_nodes(NodeClass::Full, config.partial_node_count + responses.len())
            .await?
            .into_iter()
            .filter(|node| responses.iter().all(|r| r.address != node.address))
            .take(config.partial_node_count)
            .collect();
        if secondaries.is_empty() {
            debug!(request = %request, "no secondary nodes for partial check");
            self.metrics.record_partial_check("skipped");
            return Ok(responses);
        }

        let checks = join_all(sample.iter().flat_map(|activity| {
            secondaries.iter().map(move |secondary| self.cross_check(activity, secondary))
        }))
        .await;

        let mismatched: Vec<&Activity> = sample
            .iter()
            .flat_map(|activity| std::iter::repeat(activity).take(secondaries.len()))
            .zip(&checks)
            .filter(|(_, check)| **check == Check::Mismatch)
            .map(|(activity, _)| activity)
            .collect();

        if let Some(first) = mismatched.first() {
            warn!(
                request = %request,
                node = %working.address,
                activity = %first.id,
                mismatches = mismatched.len(),
                "working response disagrees with secondary nodes"
            );
            self.metrics.record_partial_check("mismatch");
            let outcome = Outcome {
                address: working.address,
                valid_point: 0,
                invalid_point: 1,
                reason: Some(InvalidReason::PartialMismatch),
                response: Some(first.id.clone()),
            };
            self.apply_outcomes(request, &[outcome]).await?;
        } else if checks.contains(&Check::Match) {
            self.metrics.record_partial_check("match");
        } else {
            self.metrics.record_partial_check("inconclusive");
        }

        Ok(responses)
    }

    async fn cross_check(&self, activity: &Activity, secondary: &NodeEndpointCache) -> Check {
        let url = format!(
            "{}/decentralized/tx/{}",
            secondary.endpoint.trim_end_matches('/'),
            encode_segment(&activity.id)
        );
        let request = FetchRequest::get(url).with_auth(&secondary.access_token);

        let body = match self.fetcher.fetch(&request).await {
            Ok(body) => body,
            Err(e) => {
                debug!(
                    node = %secondary.address,
                    activity = %activity.id,
                    error = %e,
                    "secondary fetch failed"
                );
                return Check::Inconclusive;
            }
        };
        if !matches!(payload::classify(&body), Ok(Classification::Valid)) {
            return Check::Inconclusive;
        }
        let parsed = serde_json::from_slice::<ActivityResponse>(&body).ok();
        let Some(remote) = parsed.and_then(|r| r.data) else {
            return Check::Inconclusive;
        };

        if self.identity.load().activities_identical(activity, &remote) {
            Check::Match
        } else {
            Check::Mismatch
        }
    }
}
