use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ListingSection, StorefrontConfig};

/// Marketplace limits checked by [`inspect_descriptor`].
pub const MAX_TAGS: usize = 13;
pub const MAX_TITLE_CHARS: usize = 140;

/// One item to be listed. Loaded once from the catalog and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(alias = "filename")]
    pub source_path: PathBuf,
    pub category: String,
    pub price: f64,
    #[serde(default, alias = "compare_price")]
    pub compare_at_price: Option<f64>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "etsy_category")]
    pub marketplace_category: String,
}

impl ProductDescriptor {
    /// File stem previews are keyed by, e.g. `planner` for `products/planner.pdf`.
    pub fn stem(&self) -> Option<&str> {
        self.source_path.file_stem().and_then(|stem| stem.to_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<ProductDescriptor>,
}

impl Catalog {
    pub fn new(products: Vec<ProductDescriptor>) -> Self {
        Self { products }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.products.is_empty() {
            return Err("catalog contains no products".to_string());
        }
        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.id) {
                return Err(format!("duplicate product id {}", product.id));
            }
        }
        Ok(())
    }

    /// Descriptors to process, in catalog order.
    pub fn select(&self, only: &[u32], limit: Option<usize>) -> Vec<ProductDescriptor> {
        let selected = self
            .products
            .iter()
            .filter(|product| only.is_empty() || only.contains(&product.id))
            .cloned();
        match limit {
            Some(limit) => selected.take(limit).collect(),
            None => selected.collect(),
        }
    }
}

/// Where artifacts and their preview images live on disk.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    products_dir: PathBuf,
    previews_dir: PathBuf,
    preview_infix: String,
    preview_extension: String,
    max_previews: usize,
}

impl ArtifactLayout {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(
        products_dir: P,
        previews_dir: Q,
        section: &ListingSection,
    ) -> Self {
        Self {
            products_dir: products_dir.into(),
            previews_dir: previews_dir.into(),
            preview_infix: section.preview_infix.clone(),
            preview_extension: section.preview_extension.clone(),
            max_previews: section.max_preview_images,
        }
    }

    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self::new(
            config.resolve_path(&config.listing.products_dir),
            config.resolve_path(&config.listing.previews_dir),
            &config.listing,
        )
    }

    pub fn previews_dir(&self) -> &Path {
        &self.previews_dir
    }

    pub fn artifact_path(&self, product: &ProductDescriptor) -> PathBuf {
        if product.source_path.is_absolute() {
            product.source_path.clone()
        } else {
            self.products_dir.join(&product.source_path)
        }
    }

    /// Preview images named `<stem><infix><index>.<ext>`, ordered by index and capped.
    pub fn discover_previews(&self, product: &ProductDescriptor) -> Vec<PathBuf> {
        let Some(stem) = product.stem() else {
            return Vec::new();
        };
        let pattern = format!(
            "^{}{}(\\d+)\\.{}$",
            regex::escape(stem),
            regex::escape(&self.preview_infix),
            regex::escape(&self.preview_extension)
        );
        let matcher = match Regex::new(&pattern) {
            Ok(matcher) => matcher,
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "invalid preview pattern");
                return Vec::new();
            }
        };
        let entries = match std::fs::read_dir(&self.previews_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.previews_dir.display(), error = %err, "previews directory unavailable");
                return Vec::new();
            }
        };

        let mut found = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                let index = matcher.captures(name)?.get(1)?.as_str().parse::<u32>().ok()?;
                Some((index, entry.path()))
            })
            .collect::<Vec<_>>();
        found.sort_by_key(|(index, _)| *index);
        found
            .into_iter()
            .take(self.max_previews)
            .map(|(_, path)| path)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingLevel {
    Ok,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogFinding {
    pub product_id: u32,
    pub name: String,
    pub level: FindingLevel,
    pub detail: String,
}

/// Offline pre-flight check of one descriptor against the artifact layout.
pub fn inspect_descriptor(
    product: &ProductDescriptor,
    layout: &ArtifactLayout,
) -> Vec<CatalogFinding> {
    let finding = |level, detail: String| CatalogFinding {
        product_id: product.id,
        name: product.name.clone(),
        level,
        detail,
    };
    let mut findings = Vec::new();

    let artifact = layout.artifact_path(product);
    if artifact.is_file() {
        findings.push(finding(
            FindingLevel::Ok,
            format!("artifact {}", artifact.display()),
        ));
    } else {
        findings.push(finding(
            FindingLevel::Error,
            format!("artifact missing: {}", artifact.display()),
        ));
    }

    let previews = layout.discover_previews(product).len();
    if previews == 0 {
        findings.push(finding(
            FindingLevel::Warn,
            format!("no preview images in {}", layout.previews_dir().display()),
        ));
    } else {
        findings.push(finding(FindingLevel::Ok, format!("{previews} preview images")));
    }

    if product.tags.is_empty() {
        findings.push(finding(FindingLevel::Warn, "no tags".to_string()));
    } else if product.tags.len() > MAX_TAGS {
        findings.push(finding(
            FindingLevel::Warn,
            format!("{} tags, marketplace accepts {MAX_TAGS}", product.tags.len()),
        ));
    }

    let title_chars = product.title.chars().count();
    if title_chars > MAX_TITLE_CHARS {
        findings.push(finding(
            FindingLevel::Warn,
            format!("title has {title_chars} characters, limit is {MAX_TITLE_CHARS}"),
        ));
    }

    if product.price <= 0.0 {
        findings.push(finding(
            FindingLevel::Error,
            format!("price must be positive, got {}", product.price),
        ));
    }
    if let Some(compare) = product.compare_at_price {
        if compare < product.price {
            findings.push(finding(
                FindingLevel::Warn,
                format!("compare-at price {compare} below price {}", product.price),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn product(id: u32, file: &str) -> ProductDescriptor {
        ProductDescriptor {
            id,
            name: format!("Product {id}"),
            source_path: PathBuf::from(file),
            category: "budget".into(),
            price: 4.99,
            compare_at_price: Some(5.99),
            title: "Planner".into(),
            description: "A planner".into(),
            tags: vec!["planner".into()],
            marketplace_category: "Templates & Tools".into(),
        }
    }

    fn layout(root: &Path) -> ArtifactLayout {
        ArtifactLayout::new(
            root.join("products"),
            root.join("mockups"),
            &ListingSection::default(),
        )
    }

    #[test]
    fn previews_are_sorted_by_index_and_capped() {
        let dir = tempdir().unwrap();
        let mockups = dir.path().join("mockups");
        fs::create_dir_all(&mockups).unwrap();
        for index in [10, 2, 1, 7, 3, 4] {
            fs::write(mockups.join(format!("planner_mockup_{index}.png")), b"png").unwrap();
        }
        fs::write(mockups.join("planner_mockup_x.png"), b"png").unwrap();
        fs::write(mockups.join("other_mockup_1.png"), b"png").unwrap();
        fs::write(mockups.join("planner_mockup_5.jpg"), b"jpg").unwrap();

        let found = layout(dir.path()).discover_previews(&product(1, "planner.pdf"));
        let names = found
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "planner_mockup_1.png",
                "planner_mockup_2.png",
                "planner_mockup_3.png",
                "planner_mockup_4.png",
                "planner_mockup_7.png",
            ]
        );
    }

    #[test]
    fn missing_previews_directory_yields_nothing() {
        let dir = tempdir().unwrap();
        assert!(layout(dir.path())
            .discover_previews(&product(1, "planner.pdf"))
            .is_empty());
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let catalog = Catalog::new(vec![product(1, "a.pdf"), product(1, "b.pdf")]);
        assert_eq!(catalog.validate().unwrap_err(), "duplicate product id 1");
        assert!(Catalog::default().validate().is_err());
    }

    #[test]
    fn select_keeps_catalog_order() {
        let catalog = Catalog::new(vec![
            product(1, "a.pdf"),
            product(2, "b.pdf"),
            product(3, "c.pdf"),
        ]);
        let ids = |items: Vec<ProductDescriptor>| items.iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(ids(catalog.select(&[3, 1], None)), vec![1, 3]);
        assert_eq!(ids(catalog.select(&[], Some(2))), vec![1, 2]);
    }

    #[test]
    fn inspect_flags_missing_artifact_and_bad_price() {
        let dir = tempdir().unwrap();
        let mut item = product(4, "missing.pdf");
        item.price = 0.0;
        let findings = inspect_descriptor(&item, &layout(dir.path()));
        let errors = findings
            .iter()
            .filter(|finding| finding.level == FindingLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn descriptor_accepts_legacy_field_names() {
        let raw = r#"
            [[products]]
            id = 1
            name = "Planner"
            filename = "planner.pdf"
            category = "budget"
            price = 4.99
            compare_price = 5.99
            title = "Planner | PDF"
            description = "Plan"
            tags = ["a", "b"]
            etsy_category = "Templates & Tools"
        "#;
        let catalog: Catalog = toml::from_str(raw).unwrap();
        let item = &catalog.products[0];
        assert_eq!(item.source_path, PathBuf::from("planner.pdf"));
        assert_eq!(item.compare_at_price, Some(5.99));
        assert_eq!(item.marketplace_category, "Templates & Tools");
        assert_eq!(item.stem(), Some("planner"));
    }
}
