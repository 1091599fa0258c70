// src/store/firestore.rs
use anyhow::{anyhow, Context, Result};
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{
    auth::ServiceAccount,
    validate_document_id, Document, DocumentStore,
};

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";
const LIST_PAGE_SIZE: u32 = 300;

enum Auth {
    ServiceAccount(ServiceAccount),
    /// The local emulator accepts this fixed token and ignores security rules.
    Emulator,
}

/// Firestore over its v1 REST API.
pub struct FirestoreStore {
    client: Client,
    /// `.../v1/projects/<project>/databases/(default)/documents`
    documents_root: Url,
    auth: Auth,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<DocumentName>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DocumentName {
    name: String,
}

impl FirestoreStore {
    /// Connect as `account` to its project's default database.
    pub fn connect(account: ServiceAccount, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            documents_root: documents_root(FIRESTORE_HOST, account.project_id())?,
            auth: Auth::ServiceAccount(account),
        })
    }

    /// Talk to a Firestore emulator at `host` (`localhost:8080` style).
    pub fn emulator(host: &str, project_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            documents_root: documents_root(&format!("http://{}", host), project_id)?,
            auth: Auth::Emulator,
        })
    }

    fn document_url(&self, collection: &str, id: Option<&str>) -> Result<Url> {
        let mut url = self.documents_root.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("firestore base url cannot take path segments"))?;
            segments.extend(collection.split('/').filter(|s| !s.is_empty()));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match &self.auth {
            Auth::ServiceAccount(account) => {
                req.header(AUTHORIZATION, account.authorization().await?)
            }
            Auth::Emulator => req.bearer_auth("owner"),
        })
    }
}

fn documents_root(host: &str, project_id: &str) -> Result<Url> {
    let mut url = Url::parse(host).with_context(|| format!("invalid firestore host {}", host))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("firestore host {} cannot take path segments", host))?
        .extend(["v1", "projects", project_id, "databases", "(default)", "documents"]);
    Ok(url)
}

async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow!("{} failed with {}: {}", what, status, body))
}

impl DocumentStore for FirestoreStore {
    #[instrument(level = "debug", skip(self, doc))]
    async fn set_document(&self, collection: &str, id: &str, doc: &Document) -> Result<()> {
        validate_document_id(id)?;
        let url = self.document_url(collection, Some(id))?;
        // PATCH without an update mask replaces every field
        let req = self
            .authorize(self.client.patch(url).json(&encode_document(doc)))
            .await?;
        let resp = req
            .send()
            .await
            .with_context(|| format!("writing {}/{}", collection, id))?;
        ensure_success(resp, &format!("write of {}/{}", collection, id)).await?;
        debug!("document written");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.document_url(collection, None)?;
            {
                let mut q = url.query_pairs_mut();
                q.append_pair("pageSize", &LIST_PAGE_SIZE.to_string());
                // names only
                q.append_pair("mask.fieldPaths", "__name__");
                if let Some(tok) = &page_token {
                    q.append_pair("pageToken", tok);
                }
            }
            let resp = self
                .authorize(self.client.get(url))
                .await?
                .send()
                .await
                .with_context(|| format!("listing {}", collection))?;
            let page: ListResponse = ensure_success(resp, &format!("listing of {}", collection))
                .await?
                .json()
                .await
                .context("decoding firestore list response")?;

            ids.extend(
                page.documents
                    .iter()
                    .filter_map(|d| d.name.rsplit('/').next())
                    .map(str::to_string),
            );
            match page.next_page_token {
                Some(tok) if !tok.is_empty() => page_token = Some(tok),
                _ => break,
            }
        }
        debug!(count = ids.len(), "listed documents");
        Ok(ids)
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        validate_document_id(id)?;
        let url = self.document_url(collection, Some(id))?;
        let resp = self
            .authorize(self.client.delete(url))
            .await?
            .send()
            .await
            .with_context(|| format!("deleting {}/{}", collection, id))?;
        ensure_success(resp, &format!("delete of {}/{}", collection, id)).await?;
        Ok(())
    }
}

/// `{"fields": {...}}` request body for a document.
pub fn encode_document(doc: &Document) -> Value {
    json!({ "fields": encode_fields(doc) })
}

fn encode_fields(doc: &Document) -> Value {
    Value::Object(
        doc.iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect::<Map<String, Value>>(),
    )
}

/// Plain JSON value → Firestore typed value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // int64 travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => match n.as_u64() {
                Some(u) => json!({ "doubleValue": u as f64 }),
                None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
            },
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalar_and_nested_values() {
        let doc = json!({
            "Team": "Blue Tigers",
            "Wins": 4,
            "Ratio": 0.5,
            "Active": true,
            "Notes": null,
            "players": [{"Name": "Asha", "Age": 19}],
        })
        .as_object()
        .cloned()
        .unwrap();

        let body = encode_document(&doc);
        let fields = &body["fields"];
        assert_eq!(fields["Team"], json!({"stringValue": "Blue Tigers"}));
        assert_eq!(fields["Wins"], json!({"integerValue": "4"}));
        assert_eq!(fields["Ratio"], json!({"doubleValue": 0.5}));
        assert_eq!(fields["Active"], json!({"booleanValue": true}));
        assert_eq!(fields["Notes"], json!({"nullValue": null}));
        assert_eq!(
            fields["players"],
            json!({"arrayValue": {"values": [{"mapValue": {"fields": {
                "Name": {"stringValue": "Asha"},
                "Age": {"integerValue": "19"}
            }}}]}})
        );
    }

    #[test]
    fn document_urls_escape_ids() {
        let store = FirestoreStore::emulator("localhost:8080", "demo", Duration::from_secs(5))
            .unwrap();
        let url = store
            .document_url(
                "artifacts/1:140722212660:web:4dbae5a944e96a5c135f61/public/data/teamPlayers",
                Some("Blue Tigers"),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/artifacts/1:140722212660:web:4dbae5a944e96a5c135f61/public/data/teamPlayers/Blue%20Tigers"
        );

        let list = store.document_url("fixtures", None).unwrap();
        assert!(list.as_str().ends_with("/documents/fixtures"));
    }

    mod http {
        use super::*;
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::{TcpListener, TcpStream},
            task::JoinHandle,
        };

        struct Request {
            method: String,
            target: String,
            authorization: Option<String>,
            body: String,
        }

        /// Answers one request per connection with the canned responses, in
        /// order, and hands back what it received.
        async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<Request>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let host = listener.local_addr().unwrap().to_string();
            let handle = tokio::spawn(async move {
                let mut seen = Vec::new();
                for (status, body) in responses {
                    let (mut sock, _) = listener.accept().await.unwrap();
                    seen.push(read_request(&mut sock).await);
                    let reply = format!(
                        "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    sock.write_all(reply.as_bytes()).await.unwrap();
                    let _ = sock.shutdown().await;
                }
                seen
            });
            (host, handle)
        }

        async fn read_request(sock: &mut TcpStream) -> Request {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let mut lines = head.split("\r\n");
            let mut start = lines.next().unwrap().split(' ');
            let method = start.next().unwrap().to_string();
            let target = start.next().unwrap().to_string();
            let mut authorization = None;
            let mut length = 0usize;
            for line in lines {
                if let Some((name, value)) = line.split_once(':') {
                    match name.trim().to_ascii_lowercase().as_str() {
                        "authorization" => authorization = Some(value.trim().to_string()),
                        "content-length" => length = value.trim().parse().unwrap(),
                        _ => {}
                    }
                }
            }
            while buf.len() < head_end + length {
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            Request {
                method,
                target,
                authorization,
                body: String::from_utf8_lossy(&buf[head_end..head_end + length]).to_string(),
            }
        }

        fn store_at(host: &str) -> FirestoreStore {
            FirestoreStore::emulator(host, "demo", Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn listing_follows_page_tokens() {
            let (host, server) = serve(vec![
                (
                    200,
                    r#"{"documents": [
                        {"name": "projects/demo/databases/(default)/documents/teams/A"},
                        {"name": "projects/demo/databases/(default)/documents/teams/Blue Tigers"}
                    ], "nextPageToken": "page-2"}"#,
                ),
                (
                    200,
                    r#"{"documents": [{"name": "projects/demo/databases/(default)/documents/teams/C"}]}"#,
                ),
            ])
            .await;

            let ids = store_at(&host).list_document_ids("teams").await.unwrap();
            assert_eq!(ids, vec!["A", "Blue Tigers", "C"]);

            let seen = server.await.unwrap();
            assert_eq!(seen.len(), 2);
            assert!(seen[0].target.starts_with("/v1/projects/demo/databases/(default)/documents/teams?"));
            assert!(seen[0].target.contains("mask.fieldPaths=__name__"));
            assert!(!seen[0].target.contains("pageToken"));
            assert!(seen[1].target.contains("pageToken=page-2"));
            assert!(seen.iter().all(|r| r.method == "GET"));
            assert_eq!(seen[0].authorization.as_deref(), Some("Bearer owner"));
        }

        #[tokio::test]
        async fn empty_collection_lists_nothing() {
            let (host, server) = serve(vec![(200, "{}")]).await;
            let ids = store_at(&host).list_document_ids("teams").await.unwrap();
            assert!(ids.is_empty());
            assert_eq!(server.await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn set_document_patches_typed_fields() {
            let (host, server) = serve(vec![(200, "{}")]).await;
            let doc = json!({"id": "101", "homeScore": 2})
                .as_object()
                .cloned()
                .unwrap();

            store_at(&host)
                .set_document("fixtures", "101", &doc)
                .await
                .unwrap();

            let seen = server.await.unwrap();
            assert_eq!(seen[0].method, "PATCH");
            assert!(seen[0].target.ends_with("/documents/fixtures/101"));
            let body: Value = serde_json::from_str(&seen[0].body).unwrap();
            assert_eq!(body, encode_document(&doc));
        }

        #[tokio::test]
        async fn delete_sends_delete() {
            let (host, server) = serve(vec![(200, "{}")]).await;
            store_at(&host)
                .delete_document("news", "7")
                .await
                .unwrap();
            let seen = server.await.unwrap();
            assert_eq!(seen[0].method, "DELETE");
            assert!(seen[0].target.ends_with("/documents/news/7"));
        }

        #[tokio::test]
        async fn error_status_and_body_surface_in_the_error() {
            let (host, server) = serve(vec![
                (403, r#"{"error": {"message": "Missing or insufficient permissions."}}"#),
                (500, "backend unavailable"),
            ])
            .await;
            let store = store_at(&host);

            let err = store
                .set_document("fixtures", "101", &Document::new())
                .await
                .unwrap_err();
            let text = format!("{:#}", err);
            assert!(text.contains("write of fixtures/101"));
            assert!(text.contains("403"));
            assert!(text.contains("insufficient permissions"));

            let err = store.list_document_ids("teams").await.unwrap_err();
            assert!(format!("{:#}", err).contains("backend unavailable"));
            assert_eq!(server.await.unwrap().len(), 2);
        }
    }
}
