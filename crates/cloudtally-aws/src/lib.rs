//! AWS collectors for cloudtally
//!
//! Each collector wires one AWS service into the reconciliation engine:
//!
//! - **Route53**: hosted zones, with their record sets as children
//! - **S3**: buckets, enriched with region, website flag and tags
//! - **CloudFront**: web and streaming distributions
//! - **IAM**: users, with their access keys as children
//!
//! The collectors talk to AWS through the traits in [`api`], so they can be
//! driven by the SDK clients in [`sdk`] or by test fakes.

pub mod api;
pub mod cloudfront;
pub mod error;
pub mod iam;
pub mod route53;
pub mod s3;
pub mod sdk;

#[cfg(test)]
mod testing;

pub use cloudfront::CloudFrontCollector;
pub use error::{AwsError, Result};
pub use iam::IamCollector;
pub use route53::Route53Collector;
pub use s3::S3Collector;
pub use sdk::AwsClients;

use cloudtally_core::{Account, Collector};
use std::str::FromStr;

/// Resource family a collector covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Dns,
    S3,
    Cdn,
    Iam,
}

impl Family {
    pub const ALL: [Family; 4] = [Family::Dns, Family::S3, Family::Cdn, Family::Iam];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Dns => "dns",
            Family::S3 => "s3",
            Family::Cdn => "cdn",
            Family::Iam => "iam",
        }
    }

    /// Build the SDK-backed collector for this family
    pub fn collector(&self, clients: &AwsClients, account: Account) -> Box<dyn Collector> {
        match self {
            Family::Dns => Box::new(Route53Collector::new(clients.route53(), account)),
            Family::S3 => Box::new(S3Collector::new(clients.s3(), account)),
            Family::Cdn => Box::new(CloudFrontCollector::new(clients.cloudfront(), account)),
            Family::Iam => Box::new(IamCollector::new(clients.iam(), account)),
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = AwsError;

    fn from_str(s: &str) -> Result<Self> {
        Family::ALL
            .into_iter()
            .find(|family| family.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| AwsError::UnknownFamily(s.to_string()))
    }
}

/// Parse a list of family names; `all` expands to every family
pub fn parse_families<S: AsRef<str>>(names: &[S]) -> Result<Vec<Family>> {
    let mut families = Vec::new();
    for name in names {
        let parsed = if name.as_ref().eq_ignore_ascii_case("all") {
            Family::ALL.to_vec()
        } else {
            vec![name.as_ref().parse()?]
        };
        for family in parsed {
            if !families.contains(&family) {
                families.push(family);
            }
        }
    }
    Ok(families)
}
