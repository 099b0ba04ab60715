//! Ingestion flow: episode first, then extraction, resolution, and fact
//! writes.
//!
//! The episode is persisted before the extraction provider is called. A
//! provider failure therefore never loses data; the response carries a
//! warning and the raw episode remains available for re-processing.

use std::collections::HashMap;

use tracing::{debug, warn};

use tempograph_core::{
    match_candidate, Entity, EntityId, Episode, Fact, FactWrite, MatchDecision, PartitionFilter,
};
use tempograph_extraction::{with_retries, CandidateFact, ExtractionOutput};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{
    resolve_group_id, CustomerContext, IngestRequest, IngestResponse, TenantContext,
};

impl Engine {
    /// Ingest one episode into its tenant partition.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, EngineError> {
        let group_id = resolve_group_id(
            request.tenant_id.as_deref(),
            request.tenant_context.as_ref(),
        )?;

        let episode = Episode::new(
            group_id.clone(),
            request.data,
            request.reference_time,
            request.context.clone(),
        );
        let episode_id = episode.id;
        let extraction_text = episode.content.as_extraction_text();
        // Persisted before any provider call.
        self.store().write_episode(episode.clone());
        self.note_episode_ingested();

        let context = self.assemble_context(
            &group_id,
            episode_id,
            request.context.as_deref(),
            request.tenant_context.as_ref(),
            request.customer_context.as_ref(),
        );

        let policy = self.retry_policy();
        let extraction = match with_retries(&policy, || {
            self.extractor.extract(&extraction_text, &context)
        })
        .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(%group_id, %episode_id, %err, "extraction failed, episode kept without graph updates");
                return Ok(IngestResponse {
                    episode_id,
                    group_id,
                    entities_created: 0,
                    entities_merged: 0,
                    facts_created: 0,
                    facts_duplicated: 0,
                    facts_superseded: 0,
                    warning: Some(format!("extraction failed: {err}")),
                });
            }
        };

        let mut response = IngestResponse {
            episode_id,
            group_id: group_id.clone(),
            entities_created: 0,
            entities_merged: 0,
            facts_created: 0,
            facts_duplicated: 0,
            facts_superseded: 0,
            warning: None,
        };

        let resolved = self
            .resolve_entities(&group_id, &episode, &extraction, &mut response)
            .await;
        self.write_facts(&group_id, &episode, extraction.facts, &resolved, &mut response)
            .await;

        debug!(
            %group_id,
            %episode_id,
            entities_created = response.entities_created,
            facts_created = response.facts_created,
            "ingested episode"
        );
        Ok(response)
    }

    /// Recent-episode snippets plus tenant and customer hints, as extraction
    /// context for one new episode.
    fn assemble_context(
        &self,
        group_id: &str,
        current_episode: tempograph_core::EpisodeId,
        request_context: Option<&str>,
        tenant: Option<&TenantContext>,
        customer: Option<&CustomerContext>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(ctx) = request_context {
            parts.push(ctx.to_string());
        }
        parts.push(format!("Tenant ID: {group_id}"));
        if let Some(tc) = tenant {
            if let Some(name) = &tc.tenant_name {
                parts.push(format!("Tenant Name: {name}"));
            }
            if let Some(address) = &tc.tenant_address {
                parts.push(format!("Tenant Address: {address}"));
            }
        }
        if let Some(cc) = customer {
            if let Some(id) = &cc.customer_id {
                parts.push(format!("Customer ID: {id}"));
            }
            if let Some(name) = &cc.customer_name {
                parts.push(format!("Customer: {name}"));
            }
            if let Some(address) = &cc.customer_address {
                parts.push(format!("Customer Address: {address}"));
            }
        }
        let mut context = parts.join(". ");

        let recent = self
            .store()
            .recent_episodes(group_id, self.config.search.context_episodes);
        let snippets: Vec<String> = recent
            .iter()
            .filter(|e| e.id != current_episode)
            .map(|e| {
                let text = e.content.as_extraction_text();
                let snippet: String = text.chars().take(200).collect();
                format!("- {snippet}")
            })
            .collect();
        if !snippets.is_empty() {
            context.push_str("\n\nRecent episodes:\n");
            context.push_str(&snippets.join("\n"));
        }
        context
    }

    /// Resolve extracted entities against the partition. Returns the name to
    /// stored-id mapping for fact endpoint rewriting.
    ///
    /// Any resolver-side provider failure falls back to creating a new
    /// entity: a duplicate is recoverable, a wrong merge is not.
    async fn resolve_entities(
        &self,
        group_id: &str,
        episode: &Episode,
        extraction: &ExtractionOutput,
        response: &mut IngestResponse,
    ) -> HashMap<String, EntityId> {
        let policy = self.retry_policy();
        let resolver_config = self.config.resolver_config();
        let mut resolved: HashMap<String, EntityId> = HashMap::new();

        for candidate in &extraction.entities {
            let key = candidate.name.to_lowercase();
            if resolved.contains_key(&key) {
                continue;
            }

            let embedding = match with_retries(&policy, || self.embedder.embed(&candidate.name))
                .await
            {
                Ok(vec) => Some(vec),
                Err(err) => {
                    warn!(group_id, name = %candidate.name, %err, "embedding failed during resolution");
                    None
                }
            };

            let stored = self.store().embedded_entities(group_id);
            let decision = match self.store().find_entity_ci(group_id, &candidate.name) {
                Some(existing) => MatchDecision::Exact(existing.id),
                None => match_candidate(
                    &candidate.name,
                    embedding.as_deref(),
                    &stored,
                    &resolver_config,
                ),
            };

            let id = match decision {
                MatchDecision::Exact(id) => {
                    self.merge_provenance(group_id, id, episode);
                    response.entities_merged += 1;
                    id
                }
                MatchDecision::Fuzzy { id, name, score } => {
                    let confirmed = with_retries(&policy, || {
                        self.extractor.confirm_equivalence(&candidate.name, &name)
                    })
                    .await;
                    match confirmed {
                        Ok(true) => {
                            debug!(group_id, candidate = %candidate.name, matched = %name, score, "fuzzy merge confirmed");
                            self.merge_provenance(group_id, id, episode);
                            response.entities_merged += 1;
                            id
                        }
                        Ok(false) => {
                            self.create_entity(group_id, candidate, embedding, episode, response)
                        }
                        Err(err) => {
                            warn!(group_id, candidate = %candidate.name, %err, "equivalence check failed, creating new entity");
                            self.create_entity(group_id, candidate, embedding, episode, response)
                        }
                    }
                }
                MatchDecision::New => {
                    self.create_entity(group_id, candidate, embedding, episode, response)
                }
            };
            resolved.insert(key, id);
        }
        resolved
    }

    fn create_entity(
        &self,
        group_id: &str,
        candidate: &tempograph_extraction::CandidateEntity,
        embedding: Option<Vec<f32>>,
        episode: &Episode,
        response: &mut IngestResponse,
    ) -> EntityId {
        let mut entity = Entity::new(
            group_id,
            candidate.name.clone(),
            candidate.entity_type.clone(),
            episode.id,
        );
        entity.embedding = embedding;
        response.entities_created += 1;
        self.store().write_entity(entity)
    }

    fn merge_provenance(&self, group_id: &str, id: EntityId, episode: &Episode) {
        let filter = PartitionFilter::one(group_id);
        if let Some(mut entity) = self.store().entity(&filter, id) {
            if !entity.source_episodes.contains(&episode.id) {
                entity.source_episodes.push(episode.id);
                self.store().update_entity(entity);
            }
        }
    }

    /// Rewrite fact endpoints to resolved ids and write with idempotency and
    /// supersession. Facts naming an endpoint extraction never listed get a
    /// new entity for it rather than being dropped.
    async fn write_facts(
        &self,
        group_id: &str,
        episode: &Episode,
        facts: Vec<CandidateFact>,
        resolved: &HashMap<String, EntityId>,
        response: &mut IngestResponse,
    ) {
        let policy = self.retry_policy();
        for candidate in facts {
            let source = self
                .endpoint_id(group_id, &candidate.source, resolved, episode, response);
            let target = self
                .endpoint_id(group_id, &candidate.target, resolved, episode, response);

            let embedding =
                match with_retries(&policy, || self.embedder.embed(&candidate.assertion)).await {
                    Ok(vec) => Some(vec),
                    Err(err) => {
                        warn!(group_id, %err, "assertion embedding failed, fact stored without vector");
                        None
                    }
                };

            let mut fact = Fact::new(
                group_id,
                source,
                target,
                candidate.name,
                candidate.assertion,
                candidate.valid_at.unwrap_or(episode.valid_at),
                episode.id,
            );
            fact.embedding = embedding;

            match self.store().write_fact(fact) {
                FactWrite::Created(_) => response.facts_created += 1,
                FactWrite::Duplicate(_) => response.facts_duplicated += 1,
                FactWrite::Superseded { expired, .. } => {
                    response.facts_created += 1;
                    response.facts_superseded += expired.len();
                }
            }
        }
    }

    fn endpoint_id(
        &self,
        group_id: &str,
        name: &str,
        resolved: &HashMap<String, EntityId>,
        episode: &Episode,
        response: &mut IngestResponse,
    ) -> EntityId {
        if let Some(id) = resolved.get(&name.to_lowercase()) {
            return *id;
        }
        if let Some(existing) = self.store().find_entity_ci(group_id, name) {
            return existing.id;
        }
        response.entities_created += 1;
        self.store()
            .write_entity(Entity::new(group_id, name, "entity", episode.id))
    }
}
