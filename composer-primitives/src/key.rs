//! Template identity.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identity of a template definition: `(bundle_id, slug, version)`.
///
/// Selection instances carry the key they were created from. It is only used
/// to re-associate markers with an instance when the selection id lookup
/// fails, so two instances may share a key.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateKey {
    bundle_id: String,
    slug: String,
    version: String,
}

impl TemplateKey {
    /// Creates a key, rejecting empty components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplateKey`] when any component is blank.
    pub fn new(
        bundle_id: impl Into<String>,
        slug: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            bundle_id: bundle_id.into(),
            slug: slug.into(),
            version: version.into(),
        };

        for (field, value) in [
            ("bundle id", &key.bundle_id),
            ("slug", &key.slug),
            ("version", &key.version),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidTemplateKey {
                    key: key.to_string(),
                    reason: format!("{field} cannot be empty"),
                });
            }
        }

        Ok(key)
    }

    /// Returns the bundle identifier.
    #[must_use]
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Returns the template slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Returns the template version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Display for TemplateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.bundle_id, self.slug, self.version)
    }
}
