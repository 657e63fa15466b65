use std::collections::HashMap;

use async_trait::async_trait;
use portrait_core::constants::IMAGE_PROPERTY;
use portrait_core::{EntityConfig, EntityId, EntityInfo};
use serde::Deserialize;

use super::{EntityResolver, ResolverError, ResolverResult};

/// `wbgetentities` accepts at most this many ids per request.
const MAX_IDS_PER_REQUEST: usize = 50;

/// Properties followed by `resolve_related_entities`: father, mother, spouse, child, sibling.
const FAMILY_PROPERTIES: [&str; 5] = ["P22", "P25", "P26", "P40", "P3373"];

const USER_AGENT: &str = concat!("portrait/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: HashMap<String, RawEntity>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: Option<String>,
    missing: Option<String>,
    #[serde(default)]
    labels: HashMap<String, RawLabel>,
    #[serde(default)]
    claims: HashMap<String, Vec<RawClaim>>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    mainsnak: RawSnak,
}

#[derive(Debug, Deserialize)]
struct RawSnak {
    datavalue: Option<RawDataValue>,
}

#[derive(Debug, Deserialize)]
struct RawDataValue {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

impl RawEntity {
    fn into_info(self) -> Option<EntityInfo> {
        if self.missing.is_some() {
            return None;
        }
        let id: EntityId = self.id?.parse().ok()?;
        let labels = self
            .labels
            .into_iter()
            .map(|(lang, label)| (lang, label.value))
            .collect();
        let image_claims = self
            .claims
            .get(IMAGE_PROPERTY)
            .map(|claims| {
                claims
                    .iter()
                    .filter_map(|c| c.mainsnak.datavalue.as_ref())
                    .filter_map(|v| v.value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(EntityInfo {
            id,
            labels,
            image_claims,
        })
    }
}

/// Wikidata client: entity data from the action API, relatives from the SPARQL endpoint.
#[derive(Debug, Clone)]
pub struct WikidataClient {
    client: reqwest::Client,
    api_url: String,
    sparql_url: String,
}

impl WikidataClient {
    pub fn new(config: &EntityConfig) -> ResolverResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ResolverError::Request {
                endpoint: config.wikidata_api_url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: config.wikidata_api_url.clone(),
            sparql_url: config.wikidata_sparql_url.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> ResolverResult<T> {
        let response = self
            .client
            .get(endpoint)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResolverError::Request {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ResolverError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ResolverError::Response {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    fn relatives_query(id: &EntityId, limit: usize) -> String {
        let properties = FAMILY_PROPERTIES
            .iter()
            .map(|p| format!("wdt:{}", p))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "SELECT DISTINCT ?item WHERE {{ \
             VALUES ?relation {{ {properties} }} \
             {{ wd:{id} ?relation ?item . }} UNION {{ ?item ?relation wd:{id} . }} \
             }} LIMIT {limit}"
        )
    }
}

#[async_trait]
impl EntityResolver for WikidataClient {
    #[tracing::instrument(skip(self, ids), fields(count = ids.len(), language = %language))]
    async fn resolve_entities(
        &self,
        ids: &[EntityId],
        language: &str,
    ) -> ResolverResult<HashMap<EntityId, EntityInfo>> {
        let mut resolved = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk
                .iter()
                .map(EntityId::as_str)
                .collect::<Vec<_>>()
                .join("|");
            let response: EntitiesResponse = self
                .get_json(
                    &self.api_url,
                    &[
                        ("action", "wbgetentities"),
                        ("ids", joined.as_str()),
                        ("props", "labels|claims"),
                        ("languages", language),
                        ("format", "json"),
                    ],
                )
                .await?;

            if let Some(error) = response.error {
                return Err(ResolverError::Service {
                    code: error.code,
                    info: error.info,
                });
            }

            // Keys are the requested ids; a redirected entity carries its target in `id`.
            for (key, raw) in response.entities {
                match raw.into_info() {
                    Some(info) => {
                        let requested =
                            key.parse::<EntityId>().unwrap_or_else(|_| info.id.clone());
                        if requested != info.id {
                            tracing::debug!(
                                entity = %requested,
                                target = %info.id,
                                "Entity redirected"
                            );
                        }
                        resolved.insert(requested, info);
                    }
                    None => tracing::debug!(entity = %key, "Entity unknown to Wikidata"),
                }
            }
        }

        tracing::debug!(resolved = resolved.len(), "Entities resolved");
        Ok(resolved)
    }

    #[tracing::instrument(skip(self), fields(entity = %id))]
    async fn resolve_related_entities(
        &self,
        id: &EntityId,
        limit: usize,
    ) -> ResolverResult<Vec<EntityId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = Self::relatives_query(id, limit);
        let response: SparqlResponse = self
            .get_json(&self.sparql_url, &[("query", query.as_str()), ("format", "json")])
            .await?;

        let mut related = vec![id.clone()];
        for binding in response.results.bindings {
            let Some(item) = binding.get("item") else {
                continue;
            };
            // Entity URIs end in the id: http://www.wikidata.org/entity/Q42
            let Some(candidate) = item
                .value
                .rsplit('/')
                .next()
                .and_then(|s| s.parse::<EntityId>().ok())
            else {
                continue;
            };
            if !related.contains(&candidate) {
                related.push(candidate);
            }
        }
        related.truncate(limit);

        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> WikidataClient {
        WikidataClient::new(&EntityConfig {
            wikidata_api_url: format!("{}/w/api.php", server.url()),
            wikidata_sparql_url: format!("{}/sparql", server.url()),
            ..EntityConfig::default()
        })
        .unwrap()
    }

    fn ids(list: &str) -> Vec<EntityId> {
        EntityId::parse_list(list).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_entities_reads_labels_and_images() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "wbgetentities".into()),
                Matcher::UrlEncoded("ids".into(), "Q1|Q2|Q3".into()),
                Matcher::UrlEncoded("languages".into(), "en".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"entities":{
                    "Q1":{"id":"Q1","labels":{"en":{"language":"en","value":"Ada Lovelace"}},
                          "claims":{"P18":[
                            {"mainsnak":{"snaktype":"value","datavalue":{"value":"Ada.jpg","type":"string"}}},
                            {"mainsnak":{"snaktype":"somevalue"}}
                          ]}},
                    "Q2":{"id":"Q2","labels":{"en":{"language":"en","value":"Nobody"}},"claims":{}},
                    "Q3":{"id":"Q3","missing":""}
                }}"#,
            )
            .create_async()
            .await;

        let resolved = client(&server)
            .resolve_entities(&ids("Q1,Q2,Q3"), "en")
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
        let ada = &resolved[&"Q1".parse::<EntityId>().unwrap()];
        assert_eq!(ada.label("en"), Some("Ada Lovelace"));
        assert_eq!(ada.image_claims, vec!["Ada.jpg".to_string()]);
        let nobody = &resolved[&"Q2".parse::<EntityId>().unwrap()];
        assert!(nobody.first_image().is_none());
    }

    #[tokio::test]
    async fn test_redirected_entity_is_keyed_by_requested_id() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::UrlEncoded("ids".into(), "Q1".into()))
            .with_status(200)
            .with_body(
                r#"{"entities":{
                    "Q1":{"id":"Q2","labels":{"en":{"language":"en","value":"Merged"}},"claims":{}}
                }}"#,
            )
            .create_async()
            .await;

        let resolved = client(&server)
            .resolve_entities(&ids("Q1"), "en")
            .await
            .unwrap();

        let merged = &resolved[&"Q1".parse::<EntityId>().unwrap()];
        assert_eq!(merged.id.as_str(), "Q2");
        assert_eq!(merged.label("en"), Some("Merged"));
        assert!(!resolved.contains_key(&"Q2".parse::<EntityId>().unwrap()));
    }

    #[tokio::test]
    async fn test_resolve_entities_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error":{"code":"no-such-entity","info":"Could not find an entity"}}"#)
            .create_async()
            .await;

        let err = client(&server)
            .resolve_entities(&ids("Q1"), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::Service { ref code, .. } if code == "no-such-entity"));
    }

    #[tokio::test]
    async fn test_resolve_entities_http_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server)
            .resolve_entities(&ids("Q1"), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::Status { status: 503, .. }));
        assert!(matches!(
            portrait_core::PipelineError::from(err),
            portrait_core::PipelineError::Resolution(_)
        ));
    }

    #[tokio::test]
    async fn test_related_entities_start_with_subject() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/sparql")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"head":{"vars":["item"]},"results":{"bindings":[
                    {"item":{"type":"uri","value":"http://www.wikidata.org/entity/Q10"}},
                    {"item":{"type":"uri","value":"http://www.wikidata.org/entity/Q7"}},
                    {"item":{"type":"literal","value":"not an entity"}},
                    {"item":{"type":"uri","value":"http://www.wikidata.org/entity/Q11"}}
                ]}}"#,
            )
            .create_async()
            .await;

        let subject: EntityId = "Q7".parse().unwrap();
        let related = client(&server)
            .resolve_related_entities(&subject, 50)
            .await
            .unwrap();
        assert_eq!(related, ids("Q7,Q10,Q11"));

        let capped = client(&server)
            .resolve_related_entities(&subject, 2)
            .await
            .unwrap();
        assert_eq!(capped, ids("Q7,Q10"));
    }

    #[test]
    fn test_relatives_query_mentions_family_properties() {
        let query = WikidataClient::relatives_query(&"Q42".parse().unwrap(), 50);
        assert!(query.contains("wd:Q42"));
        assert!(query.contains("wdt:P40"));
        assert!(query.ends_with("LIMIT 50"));
    }
}
