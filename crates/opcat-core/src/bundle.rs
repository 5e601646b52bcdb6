//! Bundle model
//!
//! One installable version of one operator package, loaded from the on-disk
//! layout:
//!
//! ```text
//! <root>/manifests/*.yaml          # CSV, CRDs, other objects
//! <root>/metadata/annotations.yaml # package, channels, defaultChannel
//! <root>/metadata/dependencies.yaml (optional)
//! <root>/metadata/properties.yaml  (optional)
//! ```
//!
//! All accessors are pure; parsing happens once at load.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use semver::Version;
use sha2::{Digest, Sha256};

use crate::annotations::{Annotations, AnnotationsFile, DependenciesFile, PropertiesFile};
use crate::api::ApiKey;
use crate::csv::ClusterServiceVersion;
use crate::error::{CoreError, Result};
use crate::manifest::{self, Manifest};
use crate::property::{Dependency, Property};
use crate::version::SkipRange;

#[derive(Debug, Clone)]
pub struct Bundle {
    /// Bundle name = the CSV's `metadata.name`, globally unique in a store.
    pub name: String,
    pub package: String,
    pub channels: Vec<String>,
    pub default_channel: Option<String>,
    /// Image reference this bundle was fetched from, when known.
    pub bundle_image: Option<String>,
    csv: ClusterServiceVersion,
    manifests: Vec<Manifest>,
    declared_properties: Vec<Property>,
    declared_dependencies: Vec<Dependency>,
    digest: String,
}

impl Bundle {
    /// Load a bundle from its manifest directory.
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CoreError::BundleNotFound {
                path: root.display().to_string(),
            });
        }

        let annotations_path = root.join("metadata").join("annotations.yaml");
        if !annotations_path.exists() {
            return Err(CoreError::MissingAnnotations(root.to_path_buf()));
        }
        let annotations_file = AnnotationsFile::parse(&std::fs::read_to_string(&annotations_path)?)?;
        let annotations = annotations_file.bundle_annotations();
        if annotations.package.is_empty() {
            return Err(CoreError::InvalidBundle {
                path: root.display().to_string(),
                message: "annotations.yaml declares no package".to_string(),
            });
        }

        let mut manifests = Vec::new();
        for path in manifest_files(&root.join("manifests"))? {
            let content = std::fs::read_to_string(&path)?;
            manifests.extend(manifest::parse_documents(&content)?);
        }

        let declared_dependencies = read_optional(root, "dependencies.yaml")?
            .map(|content| serde_yaml::from_str::<DependenciesFile>(&content))
            .transpose()?
            .map(|f| f.dependencies)
            .unwrap_or_default();
        let declared_properties = read_optional(root, "properties.yaml")?
            .map(|content| serde_yaml::from_str::<PropertiesFile>(&content))
            .transpose()?
            .map(|f| f.properties)
            .unwrap_or_default();

        Self::assemble(
            annotations,
            manifests,
            declared_properties,
            declared_dependencies,
        )
        .map_err(|e| match e {
            CoreError::MissingCsv(_) => CoreError::MissingCsv(root.to_path_buf()),
            other => other,
        })
    }

    /// Assemble a bundle from already-parsed parts (the fetcher and tests
    /// construct bundles without touching a filesystem).
    pub fn assemble(
        annotations: Annotations,
        manifests: Vec<Manifest>,
        declared_properties: Vec<Property>,
        declared_dependencies: Vec<Dependency>,
    ) -> Result<Self> {
        let csv = manifests
            .iter()
            .find_map(Manifest::as_csv)
            .cloned()
            .ok_or_else(|| CoreError::MissingCsv(PathBuf::new()))?;

        // fail fast: a bundle whose CSV version does not parse never ingests
        csv.version()?;

        let digest = content_digest(&manifests);

        Ok(Self {
            name: csv.name.clone(),
            package: annotations.package,
            channels: annotations.channels,
            default_channel: annotations.default_channel,
            bundle_image: None,
            csv,
            manifests,
            declared_properties,
            declared_dependencies,
            digest,
        })
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.bundle_image = Some(image.into());
        self
    }

    pub fn csv(&self) -> &ClusterServiceVersion {
        &self.csv
    }

    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    /// sha256 over the manifest set, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn version(&self) -> Result<Version> {
        self.csv.version()
    }

    pub fn replaces(&self) -> Option<&str> {
        self.csv.replaces()
    }

    pub fn skips(&self) -> &[String] {
        self.csv.skips()
    }

    pub fn skip_range(&self) -> Result<Option<SkipRange>> {
        self.csv.skip_range()
    }

    pub fn substitutes_for(&self) -> Option<&str> {
        self.csv.substitutes_for()
    }

    /// Owned CRDs ∪ owned API services, with plurals enriched from the CRD
    /// manifests shipped alongside the CSV.
    pub fn provided_apis(&self) -> Vec<ApiKey> {
        let mut apis = self.csv.provided_apis();
        for api in &mut apis {
            if api.plural.is_empty() {
                if let Some(crd) = self
                    .manifests
                    .iter()
                    .filter_map(Manifest::as_crd)
                    .find(|crd| crd.group == api.group && crd.kind == api.kind)
                {
                    api.plural = crd.plural.clone();
                }
            }
        }
        apis
    }

    /// Required CRDs ∪ required API services ∪ GVK-typed dependencies.
    pub fn required_apis(&self) -> Vec<ApiKey> {
        let mut apis: BTreeSet<ApiKey> = self.csv.required_apis().into_iter().collect();
        for dep in &self.declared_dependencies {
            if let Some(api) = dep.clone().into_property().as_api_key() {
                apis.insert(api);
            }
        }
        apis.into_iter().collect()
    }

    /// The full property set: package identity, one GVK property per
    /// provided API, then everything declared in `properties.yaml`.
    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::package(&self.package, &self.csv.spec.version)];
        properties.extend(self.provided_apis().iter().map(Property::gvk));
        properties.extend(self.declared_properties.iter().cloned());
        properties
    }

    /// Legacy dependency list, as declared.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.declared_dependencies
    }

    /// Install-strategy images ∪ explicit relatedImages.
    pub fn images(&self) -> Vec<String> {
        let mut images: BTreeSet<String> = self.csv.operator_images().into_iter().collect();
        images.extend(self.csv.spec.related_images.iter().map(|r| r.image.clone()));
        images.into_iter().collect()
    }

    /// The CRD manifests the bundle ships.
    pub fn crds(&self) -> impl Iterator<Item = &crate::crd::CrdManifest> {
        self.manifests.iter().filter_map(Manifest::as_crd)
    }

    /// Every manifest as its JSON encoding, CSV included, in load order.
    pub fn objects(&self) -> Vec<String> {
        self.manifests.iter().map(|m| m.raw().to_string()).collect()
    }

    pub fn csv_json(&self) -> String {
        self.csv.raw.to_string()
    }
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") | Some("json") => files.push(path.to_path_buf()),
            _ => {}
        }
    }
    files.sort();
    Ok(files)
}

fn read_optional(root: &Path, name: &str) -> Result<Option<String>> {
    let path = root.join("metadata").join(name);
    if path.exists() {
        Ok(Some(std::fs::read_to_string(path)?))
    } else {
        Ok(None)
    }
}

fn content_digest(manifests: &[Manifest]) -> String {
    let mut docs: Vec<String> = manifests.iter().map(|m| m.raw().to_string()).collect();
    docs.sort();
    let mut hasher = Sha256::new();
    for doc in docs {
        hasher.update(doc.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_bundle_dir(root: &Path) {
        fs::create_dir_all(root.join("manifests")).unwrap();
        fs::create_dir_all(root.join("metadata")).unwrap();
        fs::write(
            root.join("manifests/csv.yaml"),
            r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: etcdoperator.v0.9.4
spec:
  version: 0.9.4
  replaces: etcdoperator.v0.9.2
  customresourcedefinitions:
    owned:
    - name: etcdclusters.etcd.database.coreos.com
      version: v1beta2
      kind: EtcdCluster
"#,
        )
        .unwrap();
        fs::write(
            root.join("manifests/crd.yaml"),
            r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: etcdclusters.etcd.database.coreos.com
spec:
  group: etcd.database.coreos.com
  scope: Namespaced
  names:
    kind: EtcdCluster
    plural: etcdclusters
  versions:
  - name: v1beta2
    served: true
    storage: true
"#,
        )
        .unwrap();
        fs::write(
            root.join("metadata/annotations.yaml"),
            r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: etcd
  operators.operatorframework.io.bundle.channels.v1: "stable,beta"
  operators.operatorframework.io.bundle.channel.default.v1: stable
"#,
        )
        .unwrap();
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(dir.path());

        let bundle = Bundle::from_dir(dir.path()).unwrap();
        assert_eq!(bundle.name, "etcdoperator.v0.9.4");
        assert_eq!(bundle.package, "etcd");
        assert_eq!(bundle.channels, ["stable", "beta"]);
        assert_eq!(bundle.version().unwrap().to_string(), "0.9.4");
        assert_eq!(bundle.replaces(), Some("etcdoperator.v0.9.2"));
    }

    #[test]
    fn test_missing_annotations_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("manifests")).unwrap();
        let err = Bundle::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::MissingAnnotations(_)));
    }

    #[test]
    fn test_properties_include_package_and_gvk() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(dir.path());
        let bundle = Bundle::from_dir(dir.path()).unwrap();

        let properties = bundle.properties();
        assert!(properties.iter().any(|p| p.type_ == "olm.package"));
        assert!(properties.iter().any(|p| p.type_ == "olm.gvk"));
    }

    #[test]
    fn test_provided_api_plural_from_crd() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(dir.path());
        let bundle = Bundle::from_dir(dir.path()).unwrap();

        let apis = bundle.provided_apis();
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].plural, "etcdclusters");
    }

    #[test]
    fn test_dependency_apis_are_required() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(dir.path());
        fs::write(
            dir.path().join("metadata/dependencies.yaml"),
            r#"
dependencies:
- type: olm.gvk
  value:
    group: postgres.example.com
    version: v1
    kind: Postgres
"#,
        )
        .unwrap();

        let bundle = Bundle::from_dir(dir.path()).unwrap();
        let apis = bundle.required_apis();
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].kind, "Postgres");
    }

    #[test]
    fn test_digest_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_dir(dir.path());
        let a = Bundle::from_dir(dir.path()).unwrap();
        let b = Bundle::from_dir(dir.path()).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
