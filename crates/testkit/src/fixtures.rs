//! Domain value fixtures.

use codebase_index_domain::{
    PackageInfo, ServiceRegistryEntry, ServiceStatus, VersionDescriptor, VersionId, VersionInfo,
    VersionStatus,
};

/// Catalog descriptor laid out like the release origin does.
pub fn descriptor(major: u32, minor: u32, micro: u32) -> VersionDescriptor {
    let version = VersionId::new(major, minor, micro);
    VersionDescriptor {
        version_id: version,
        app_url: format!("/linux/amd64/{version}/codebase-indexer"),
        info_url: format!("/linux/amd64/{version}/package.json"),
    }
}

/// Package metadata whose checksum encodes the version.
pub fn package(major: u32, minor: u32, micro: u32) -> PackageInfo {
    let version = VersionId::new(major, minor, micro);
    PackageInfo {
        package_name: "codebase-indexer".to_owned(),
        os: "linux".to_owned(),
        arch: "amd64".to_owned(),
        size: 46,
        checksum: format!("{:032x}", u128::from(major) << 64 | u128::from(minor) << 32 | u128::from(micro)),
        checksum_algo: "md5".to_owned(),
        sign: "00".to_owned(),
        version_id: version,
        build: "fixture".to_owned(),
        description: String::new(),
    }
}

/// Install record for `version` in `status`, last touched at `update_at`.
pub fn version_info(major: u32, minor: u32, micro: u32, status: VersionStatus, update_at: u64) -> VersionInfo {
    VersionInfo::from_descriptor(
        &descriptor(major, minor, micro),
        Some(package(major, minor, micro)),
        status,
        update_at,
    )
}

/// Registry entry for `name` on `port`.
pub fn service(name: &str, status: ServiceStatus, port: u16) -> ServiceRegistryEntry {
    ServiceRegistryEntry {
        name: name.to_owned(),
        status,
        protocol: "http".to_owned(),
        port,
    }
}
