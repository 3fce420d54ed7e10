//! Column mapping model.
//!
//! A [`ColumnMapping`] assigns each semantic [`Role`] to at most one column of
//! a sheet, and each column to at most one role. Assigning a column that some
//! other role already holds moves it (last writer wins).

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::warn;

use crate::error::{SheetError, SheetResult};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum Role {
    Style,
    Brand,
    Category,
    ColorName,
    Msrp,
    ReadImage,
    ImageAdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleIcon {
    Hash,
    Tag,
    Layers,
    Palette,
    DollarSign,
    Image,
    ImagePlus,
}

/// Presentation data for a role, kept apart from the mapping itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleMeta {
    pub role: Role,
    pub label: &'static str,
    pub icon: RoleIcon,
}

const ROLE_META: [RoleMeta; Role::COUNT] = [
    RoleMeta {
        role: Role::Style,
        label: "style",
        icon: RoleIcon::Hash,
    },
    RoleMeta {
        role: Role::Brand,
        label: "brand",
        icon: RoleIcon::Tag,
    },
    RoleMeta {
        role: Role::Category,
        label: "category",
        icon: RoleIcon::Layers,
    },
    RoleMeta {
        role: Role::ColorName,
        label: "color",
        icon: RoleIcon::Palette,
    },
    RoleMeta {
        role: Role::Msrp,
        label: "MSRP",
        icon: RoleIcon::DollarSign,
    },
    RoleMeta {
        role: Role::ReadImage,
        label: "image column",
        icon: RoleIcon::Image,
    },
    RoleMeta {
        role: Role::ImageAdd,
        label: "image target column",
        icon: RoleIcon::ImagePlus,
    },
];

static CAPITAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z])").expect("valid regex"));

impl Role {
    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn meta(self) -> &'static RoleMeta {
        &ROLE_META[self as usize]
    }

    /// Badge text: a space before every capital of the key, trimmed
    /// (`colorName` becomes `color Name`).
    pub fn badge_label(self) -> String {
        CAPITAL.replace_all(self.key(), " $1").trim().to_string()
    }
}

pub(crate) static STYLE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(style|product style|style\s*(#|no|number|id)|sku|item\s*(#|no|number))")
        .expect("valid regex")
});
pub(crate) static BRAND_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(brand|manufacturer|make|label|designer|vendor)").expect("valid regex")
});
pub(crate) static MSRP_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(msrp|manufacturer\s*suggested\s*retail\s*price|list\s*price|suggested\s*retail)",
    )
    .expect("valid regex")
});
static IMAGE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(image|photo|picture|img|readImage|imageAdd)").expect("valid regex")
});

/// Role to column assignment for one sheet. `None` is unmapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub style: Option<usize>,
    pub brand: Option<usize>,
    pub category: Option<usize>,
    pub color_name: Option<usize>,
    pub msrp: Option<usize>,
    pub read_image: Option<usize>,
    pub image_add: Option<usize>,
}

impl ColumnMapping {
    pub fn get(&self, role: Role) -> Option<usize> {
        match role {
            Role::Style => self.style,
            Role::Brand => self.brand,
            Role::Category => self.category,
            Role::ColorName => self.color_name,
            Role::Msrp => self.msrp,
            Role::ReadImage => self.read_image,
            Role::ImageAdd => self.image_add,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<usize> {
        match role {
            Role::Style => &mut self.style,
            Role::Brand => &mut self.brand,
            Role::Category => &mut self.category,
            Role::ColorName => &mut self.color_name,
            Role::Msrp => &mut self.msrp,
            Role::ReadImage => &mut self.read_image,
            Role::ImageAdd => &mut self.image_add,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (Role, Option<usize>)> + '_ {
        Role::iter().map(move |role| (role, self.get(role)))
    }

    /// Returns a copy with `role` on `index`, after unmapping `index` from
    /// whichever role held it. Out-of-range indices leave `self` untouched.
    pub fn with_assignment(
        &self,
        role: Role,
        index: usize,
        header_count: usize,
    ) -> SheetResult<Self> {
        if index >= header_count {
            return Err(SheetError::InvalidColumnIndex {
                index,
                header_count,
            });
        }
        let mut next = self.with_column_cleared(index);
        *next.slot_mut(role) = Some(index);
        Ok(next)
    }

    pub fn with_role_cleared(&self, role: Role) -> Self {
        let mut next = *self;
        *next.slot_mut(role) = None;
        next
    }

    pub fn with_column_cleared(&self, index: usize) -> Self {
        let mut next = *self;
        for role in Role::iter() {
            if next.get(role) == Some(index) {
                *next.slot_mut(role) = None;
            }
        }
        next
    }

    pub fn is_column_mapped(&self, index: usize) -> bool {
        self.entries().any(|(_, column)| column == Some(index))
    }

    /// First role (in declaration order) holding `index`.
    pub fn role_for_column(&self, index: usize) -> Option<Role> {
        let mut holders = self
            .entries()
            .filter(|(_, column)| *column == Some(index))
            .map(|(role, _)| role);
        let first = holders.next();
        if let Some(second) = holders.next() {
            warn!(
                column = index,
                first = %first.map(Role::key).unwrap_or_default(),
                second = %second,
                "column is mapped to more than one role"
            );
        }
        first
    }

    pub fn mapped_columns(&self) -> BTreeSet<usize> {
        self.entries().filter_map(|(_, column)| column).collect()
    }

    pub fn is_unmapped(&self) -> bool {
        self.entries().all(|(_, column)| column.is_none())
    }

    /// Columns held by more than one role. Always empty for mappings built
    /// through `with_assignment`.
    pub fn duplicate_columns(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for (_, column) in self.entries() {
            if let Some(column) = column
                && !seen.insert(column)
            {
                duplicates.insert(column);
            }
        }
        duplicates.into_iter().collect()
    }

    /// Guess a mapping from header text. Each role takes the first matching
    /// column and each column feeds at most one role.
    pub fn auto_map(headers: &[String]) -> Self {
        let mut mapping = Self::default();
        for (index, header) in headers.iter().enumerate() {
            let header = header.trim();
            if header.is_empty() {
                continue;
            }
            if STYLE_HEADER.is_match(header) && mapping.style.is_none() {
                mapping.style = Some(index);
            } else if BRAND_HEADER.is_match(header) && mapping.brand.is_none() {
                mapping.brand = Some(index);
            } else if MSRP_HEADER.is_match(header) && mapping.msrp.is_none() {
                mapping.msrp = Some(index);
            } else if IMAGE_HEADER.is_match(header)
                && mapping.read_image.is_none()
                && mapping.image_add.is_none()
            {
                mapping.read_image = Some(index);
            }
        }
        mapping
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingState {
    Unmapped,
    PartiallyMapped,
    FullyMapped,
}

/// Which roles a job type needs before a sheet can be submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MappingProfile {
    #[default]
    GoogleImages,
    ImagesAndMsrp,
    ImagesOnly,
    MsrpOnly,
}

impl MappingProfile {
    pub fn label(self) -> &'static str {
        match self {
            MappingProfile::GoogleImages => "Google images",
            MappingProfile::ImagesAndMsrp => "Images + MSRP",
            MappingProfile::ImagesOnly => "Images only",
            MappingProfile::MsrpOnly => "MSRP only",
        }
    }

    pub fn required_roles(self) -> &'static [Role] {
        match self {
            MappingProfile::GoogleImages | MappingProfile::ImagesOnly => &[Role::Style],
            MappingProfile::ImagesAndMsrp | MappingProfile::MsrpOnly => &[Role::Style, Role::Msrp],
        }
    }

    pub fn optional_roles(self) -> &'static [Role] {
        match self {
            MappingProfile::GoogleImages => {
                &[Role::Brand, Role::Category, Role::ColorName, Role::Msrp]
            }
            MappingProfile::ImagesAndMsrp | MappingProfile::MsrpOnly => &[Role::Brand],
            MappingProfile::ImagesOnly => &[],
        }
    }

    pub fn requires_image_column(self) -> bool {
        matches!(self, MappingProfile::ImagesOnly)
    }

    pub fn allows_image_column(self) -> bool {
        !matches!(self, MappingProfile::MsrpOnly)
    }
}
