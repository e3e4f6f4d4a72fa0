use crate::s3;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;

/// Object store holding the Earth Search Sentinel-2 COGs.
pub struct Provider {
    client: Client,
}

impl Provider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_profile(profile_name: &str) -> Self {
        let client = s3::client_from_profile(profile_name, s3::DEFAULT_REGION).await;
        Self { client }
    }

    pub async fn as_anon() -> Self {
        let client = s3::anon_client(s3::DEFAULT_REGION).await;
        Self { client }
    }

    /// Named profile when one is configured, anonymous access otherwise.
    pub async fn connect(profile_name: Option<&str>) -> Self {
        match profile_name {
            Some(profile) => Self::from_profile(profile).await,
            None => Self::as_anon().await,
        }
    }
}

impl s3::S3ObjOps for Provider {
    async fn head_object(&self, bucket: &str, key: &str) -> anyhow::Result<HeadObjectOutput> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(head)
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> anyhow::Result<GetObjectOutput> {
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await?;
        Ok(object)
    }
}
