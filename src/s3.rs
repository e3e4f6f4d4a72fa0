//! Utility functions for creating s3 clients and locating s3 objects
use anyhow::{anyhow, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;
use regex::Regex;

/// Region of the public Sentinel-2 COG bucket.
pub const DEFAULT_REGION: &str = "us-west-2";

pub async fn client_from_profile(profile_name: &str, region: &str) -> Client {
    let base_config = aws_config::defaults(BehaviorVersion::latest())
        .profile_name(profile_name)
        .region(Region::new(region.to_owned()))
        .load()
        .await;
    Client::new(&base_config)
}

pub async fn anon_client(region: &str) -> Client {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .no_credentials()
        .region(Region::new(region.to_owned()))
        .load()
        .await;
    Client::new(&config)
}

pub trait S3ObjOps {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput>;

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput>;
}

#[derive(Debug, PartialEq, Clone)]
pub struct S3Object {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Parses a virtual-hosted style url such as
    /// `https://<bucket>.s3.<region>.amazonaws.com/<key>`.
    pub fn from_url(url: &str) -> Result<Self> {
        let re = Regex::new(r"https://(?<bucket>[^.]+)\.s3\.(?<region>[^.]+)\.amazonaws\.com/(?<key>.+)")
            .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;

        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_object_from_url() {
        let url = "https://sentinel-cogs.s3.us-west-2.amazonaws.com/sentinel-s2-l2a-cogs/34/T/CT/2024/5/S2A_34TCT_20240529_0_L2A/B04.tif";
        let object = S3Object::from_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "sentinel-cogs".to_string(),
                region: "us-west-2".to_string(),
                key: "sentinel-s2-l2a-cogs/34/T/CT/2024/5/S2A_34TCT_20240529_0_L2A/B04.tif"
                    .to_string()
            }
        );
    }

    #[test]
    fn test_s3_object_rejects_other_hosts() {
        assert!(S3Object::from_url("https://example.com/B04.tif").is_err());
    }
}
