//! The out-of-scope collaborator: talks to the S3-compatible bucket.
//!
//! `ObjectClient` is the seam the rest of the crate programs against; the
//! concrete `S3ObjectClient` below is the only piece that knows about
//! `aws-sdk-s3`. A `MockObjectClient` used by tests lives alongside it so
//! MetaStore/Scanner/HandleTable/FSBridge tests never touch the network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::config::MountTarget;
use crate::error::FsError;

#[derive(Debug, Clone)]
pub struct ListedEntry {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: i64,
}

/// A single bucket-event record, folded into the metadata cache by the
/// `EventReconciler`.
#[derive(Debug, Clone)]
pub enum BucketEvent {
    Created(ListedEntry),
    Removed { key: String },
}

pub type EventStream = BoxStream<'static, Result<BucketEvent, FsError>>;

/// Header carrying this mount's account identifier on every upload, so the
/// reconciler can in principle recognize and drop echoes of its own writes.
/// Wiring the drop-on-match filter itself remains open, see DESIGN.md.
pub const ORIGIN_HEADER: &str = "x-amz-meta-origin";

#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ListedEntry>, FsError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, FsError>;
    async fn put_object(&self, key: &str, body: Bytes, origin_tag: &str) -> Result<String, FsError>;
    async fn remove_object(&self, key: &str) -> Result<(), FsError>;
    async fn bucket_location(&self) -> Result<String, FsError>;

    /// Subscribes to `ObjectCreatedAll`/`ObjectRemovedAll` events for this
    /// bucket. `account_id` namespaces the subscription the way the source
    /// namespaces its `arn:minio:sns:<region>::<accountID>:listen` topic.
    async fn subscribe_events(&self, account_id: &str) -> Result<EventStream, FsError>;
}

/// S3-compatible object store backend built on `aws-sdk-s3`, pointed at a
/// non-AWS endpoint (MinIO or compatible) via a custom endpoint URL and
/// forced path-style addressing.
pub struct S3ObjectClient {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    poll_interval: Duration,
}

impl S3ObjectClient {
    pub async fn connect(target: &MountTarget) -> Result<Self, FsError> {
        let scheme = if target.use_tls { "https" } else { "http" };
        let endpoint_url = format!("{scheme}://{}", target.endpoint);

        let credentials = aws_credential_types::Credentials::new(
            target.access_key.clone(),
            target.secret_key.clone(),
            None,
            None,
            "s3fuse-mount-config",
        );

        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .region(aws_config::Region::new("us-east-1"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: target.bucket.clone(),
            prefix: target.prefix.clone(),
            poll_interval: Duration::from_secs(3),
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else if key.is_empty() {
            format!("{}/", self.prefix)
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ListedEntry>, FsError> {
        let full_prefix = self.full_key(prefix);
        let mut entries = Vec::new();
        let mut continuation = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .delimiter("/");
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| FsError::Transport(e.to_string()))?;

            for common in resp.common_prefixes() {
                if let Some(p) = common.prefix() {
                    entries.push(ListedEntry {
                        key: p.to_string(),
                        size: 0,
                        etag: String::new(),
                        last_modified: 0,
                    });
                }
            }
            for obj in resp.contents() {
                let key = obj.key().unwrap_or_default().to_string();
                if key == full_prefix {
                    continue;
                }
                entries.push(ListedEntry {
                    key,
                    size: obj.size().unwrap_or(0) as u64,
                    etag: obj.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                    last_modified: obj
                        .last_modified()
                        .map(|t| t.secs())
                        .unwrap_or(0),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(entries)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, FsError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|e| e.is_no_such_key()).unwrap_or(false) {
                    FsError::NoSuchObject
                } else {
                    FsError::Transport(e.to_string())
                }
            })?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?
            .into_bytes();
        Ok(bytes)
    }

    async fn put_object(&self, key: &str, body: Bytes, origin_tag: &str) -> Result<String, FsError> {
        let resp = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .metadata("origin", origin_tag)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?;
        Ok(resp.e_tag().unwrap_or_default().trim_matches('"').to_string())
    }

    async fn remove_object(&self, key: &str) -> Result<(), FsError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn bucket_location(&self) -> Result<String, FsError> {
        let resp = self
            .client
            .get_bucket_location()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?;
        Ok(resp
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default())
    }

    /// `aws-sdk-s3` speaks the vanilla S3 API and has no equivalent of
    /// MinIO's `ListenBucketNotification` long-poll. This client emulates
    /// the same `EventStream` contract by periodically re-listing the
    /// whole bucket and diffing against the previous snapshot, at the cost
    /// of giving up push-based low latency. A MinIO-specific SDK would let
    /// this method subscribe directly; see DESIGN.md.
    async fn subscribe_events(&self, _account_id: &str) -> Result<EventStream, FsError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = self.prefix.clone();
        let interval = self.poll_interval;

        let stream = stream::unfold(
            (client, bucket, prefix, interval, None::<Vec<String>>),
            move |(client, bucket, prefix, interval, mut seen)| async move {
                tokio::time::sleep(interval).await;
                let resp = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .send()
                    .await;

                let resp = match resp {
                    Ok(r) => r,
                    Err(e) => {
                        return Some((
                            Err(FsError::Transport(e.to_string())),
                            (client, bucket, prefix, interval, seen),
                        ))
                    }
                };

                let current: Vec<String> = resp
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(|k| k.to_string()))
                    .collect();

                let previous = seen.take().unwrap_or_default();
                let created: Vec<String> = current
                    .iter()
                    .filter(|k| !previous.contains(k))
                    .cloned()
                    .collect();
                let removed: Vec<String> = previous
                    .iter()
                    .filter(|k| !current.contains(k))
                    .cloned()
                    .collect();

                let event = if let Some(key) = created.into_iter().next() {
                    let entry = resp
                        .contents()
                        .iter()
                        .find(|o| o.key() == Some(key.as_str()))
                        .map(|o| ListedEntry {
                            key: key.clone(),
                            size: o.size().unwrap_or(0) as u64,
                            etag: o.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                            last_modified: o.last_modified().map(|t| t.secs()).unwrap_or(0),
                        })
                        .unwrap_or(ListedEntry {
                            key: key.clone(),
                            size: 0,
                            etag: String::new(),
                            last_modified: 0,
                        });
                    Ok(BucketEvent::Created(entry))
                } else if let Some(key) = removed.into_iter().next() {
                    Ok(BucketEvent::Removed { key })
                } else {
                    Ok(BucketEvent::Removed { key: String::new() })
                };

                Some((event, (client, bucket, prefix, interval, Some(current))))
            },
        )
        .filter(|e| {
            let keep = !matches!(e, Ok(BucketEvent::Removed { key }) if key.is_empty());
            async move { keep }
        })
        .boxed();

        Ok(stream)
    }
}

/// In-memory `ObjectClient` for unit and integration tests. Stores bodies
/// in a map and lets tests push synthetic events onto the notification
/// stream to exercise the `EventReconciler` without a live bucket.
#[derive(Default)]
pub struct MockObjectClient {
    objects: Mutex<std::collections::BTreeMap<String, (Bytes, String)>>,
    events: Mutex<Vec<BucketEvent>>,
}

impl MockObjectClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_event(&self, event: BucketEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn seed(&self, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::copy_from_slice(body), "seed-etag".into()));
    }
}

#[async_trait]
impl ObjectClient for MockObjectClient {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ListedEntry>, FsError> {
        let objects = self.objects.lock().unwrap();
        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for (key, (body, etag)) in objects.iter() {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(i) => {
                    let dir = format!("{prefix}{}/", &rest[..i]);
                    if seen_dirs.insert(dir.clone()) {
                        out.push(ListedEntry {
                            key: dir,
                            size: 0,
                            etag: String::new(),
                            last_modified: 0,
                        });
                    }
                }
                None => out.push(ListedEntry {
                    key: key.clone(),
                    size: body.len() as u64,
                    etag: etag.clone(),
                    last_modified: 0,
                }),
            }
        }
        Ok(out)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, FsError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(b, _)| b.clone())
            .ok_or(FsError::NoSuchObject)
    }

    async fn put_object(&self, key: &str, body: Bytes, _origin_tag: &str) -> Result<String, FsError> {
        let etag = format!("etag-{}", body.len());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, etag.clone()));
        Ok(etag)
    }

    async fn remove_object(&self, key: &str) -> Result<(), FsError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn bucket_location(&self) -> Result<String, FsError> {
        Ok("us-east-1".to_string())
    }

    async fn subscribe_events(&self, _account_id: &str) -> Result<EventStream, FsError> {
        let events = self.events.lock().unwrap().drain(..).map(Ok).collect::<Vec<_>>();
        Ok(stream::iter(events).boxed())
    }
}
