//! Post category vocabulary and the unique-category rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;
use crate::domain::posts::PostCategoryRecord;

/// Fixed category vocabulary, mirroring the backend enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostCategory {
    Rana,
    SinSonido,
    MemeArtesanal,
    NoSeYo,
    Oro,
    Diamante,
    Meh,
    AlertaGlonetillo,
    Grr,
    Ensordecedor,
    Raguuul,
}

impl PostCategory {
    pub const ALL: [PostCategory; 11] = [
        PostCategory::Rana,
        PostCategory::SinSonido,
        PostCategory::MemeArtesanal,
        PostCategory::NoSeYo,
        PostCategory::Oro,
        PostCategory::Diamante,
        PostCategory::Meh,
        PostCategory::AlertaGlonetillo,
        PostCategory::Grr,
        PostCategory::Ensordecedor,
        PostCategory::Raguuul,
    ];

    /// Unique categories are restricted to one per post.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            PostCategory::Diamante | PostCategory::Oro | PostCategory::Rana
        )
    }

    /// Human-readable label shown next to the badge.
    pub fn display_name(self) -> &'static str {
        match self {
            PostCategory::Rana => "RANITA TRISTE",
            PostCategory::SinSonido => "SIN SONIDO",
            PostCategory::MemeArtesanal => "MEME ARTESANAL",
            PostCategory::NoSeYo => "NO SÉ YO",
            PostCategory::Oro => "ORO",
            PostCategory::Diamante => "DIAMANTE",
            PostCategory::Meh => "MEH",
            PostCategory::AlertaGlonetillo => "ALERTA GLONETILLO",
            PostCategory::Grr => "GRR",
            PostCategory::Ensordecedor => "ENSORDECEDOR",
            PostCategory::Raguuul => "RAGUUUL",
        }
    }
}

impl fmt::Display for PostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The additions and removals a category edit resolves to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryChangeSet {
    pub additions: Vec<PostCategory>,
    pub removals: Vec<PostCategoryRecord>,
}

impl CategoryChangeSet {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Reject a desired category set carrying more than one unique category.
pub fn validate_unique(desired: &[PostCategory]) -> Result<(), DomainError> {
    let mut uniques = desired.iter().copied().filter(|c| c.is_unique());
    let Some(first) = uniques.next() else {
        return Ok(());
    };
    match uniques.find(|c| *c != first) {
        Some(second) => Err(DomainError::validation(format!(
            "a post admits one unique category at most, got {first} and {second}"
        ))),
        None => Ok(()),
    }
}

/// Diff the currently attached categories against the desired set.
///
/// Additions are desired categories not yet attached; removals are attached
/// records whose category left the desired set. Order follows the inputs so
/// mutations fire in a predictable sequence.
pub fn diff_categories(
    current: &[PostCategoryRecord],
    desired: &[PostCategory],
) -> CategoryChangeSet {
    let additions = desired
        .iter()
        .copied()
        .filter(|category| !current.iter().any(|rec| rec.category == *category))
        .collect();
    let removals = current
        .iter()
        .filter(|rec| !desired.contains(&rec.category))
        .cloned()
        .collect();
    CategoryChangeSet {
        additions,
        removals,
    }
}
