//! S3-backed implementation of the ObjectStore.
//! Buckets are containers; the object ETag is the item fingerprint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use log::debug;

use crate::errors::ScanError;
use crate::store::{required, Container, Credentials, Item, ObjectStore, Page};

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// Expects `access_key_id`, `secret_key` and `region`. An optional
    /// `endpoint` targets S3-compatible servers and switches to path-style URLs.
    pub async fn connect(credentials: &Credentials) -> Result<Self, ScanError> {
        let access_key_id = required(credentials, "s3", "access_key_id")?;
        let secret_key = required(credentials, "s3", "secret_key")?;
        let region = required(credentials, "s3", "region")?.to_string();
        let endpoint = credentials.get("endpoint").filter(|e| !e.trim().is_empty());

        let static_credentials =
            AwsCredentials::new(access_key_id, secret_key, None, None, "scrubscan-static");
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(static_credentials);
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint.trim());
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            region,
        })
    }
}

fn normalize_etag(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

#[async_trait]
impl ObjectStore for S3Store {
    fn kind(&self) -> &str {
        "s3"
    }

    async fn create_container(&self, name: &str) -> Result<Container> {
        let mut request = self.client.create_bucket().bucket(name);
        if self.region != DEFAULT_REGION {
            let location = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(location);
        }

        match request.send().await {
            Ok(_) => Ok(Container::new(name)),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_bucket_already_owned_by_you() || service_err.is_bucket_already_exists() {
                    debug!("Bucket '{}' already exists, reusing it.", name);
                    Ok(Container::new(name))
                } else {
                    Err(anyhow::Error::new(service_err))
                        .with_context(|| format!("Failed to create bucket '{}'", name))
                }
            }
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .with_context(|| format!("Failed to remove bucket '{}'", name))?;
        Ok(())
    }

    async fn list_page(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page> {
        let max_keys = i32::try_from(page_size).unwrap_or(i32::MAX);
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&container.name)
            .max_keys(max_keys)
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .with_context(|| format!("Failed to list bucket '{}'", container.name))?;

        let items = resp
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                if key.ends_with('/') {
                    return None;
                }
                Some(Item {
                    container: container.name.clone(),
                    name: key.to_string(),
                    fingerprint: normalize_etag(object.e_tag()),
                    size: object.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        let next = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn open(&self, item: &Item) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&item.container)
            .key(&item.name)
            .send()
            .await
            .with_context(|| format!("Failed to open {}", item.path()))?;
        let bytes = resp
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of {}", item.path()))?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item> {
        let size = content.len() as u64;
        let resp = self
            .client
            .put_object()
            .bucket(&container.name)
            .key(name)
            .body(ByteStream::from(content))
            .send()
            .await
            .with_context(|| format!("Failed to upload {}/{}", container.name, name))?;
        Ok(Item {
            container: container.name.clone(),
            name: name.to_string(),
            fingerprint: normalize_etag(resp.e_tag()),
            size,
        })
    }
}
