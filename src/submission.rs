//! Per-sheet job descriptions handed to the upload collaborator.

use serde::Serialize;

use crate::error::{SheetError, SheetResult};
use crate::mapping::{MappingProfile, Role};
use crate::sheet::{SheetConfig, ValueSource};
use crate::utils::column_index_to_letter;

/// Column marker used when the brand comes from a typed-in value.
pub const MANUAL_COLUMN: &str = "MANUAL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSubmission {
    pub sheet_name: String,
    /// 1-based position in the workbook
    pub sheet_index: usize,
    /// 1-based header row
    pub header_row: usize,
    pub style_column: String,
    pub brand_column: Option<String>,
    pub manual_brand: Option<String>,
    pub image_column: Option<String>,
    pub color_column: Option<String>,
    pub category_column: Option<String>,
    pub msrp_column: Option<String>,
}

impl SheetSubmission {
    /// Image columns are left out for profiles that never fetch images.
    pub fn from_config(config: &SheetConfig, profile: MappingProfile) -> SheetResult<Self> {
        let letter = |role: Role| config.column_mapping.get(role).map(column_index_to_letter);

        let style_column = letter(Role::Style).ok_or_else(|| SheetError::MissingRequiredRole {
            sheet: config.name.clone(),
            role: Role::Style,
        })?;

        let (brand_column, manual_brand) = match config.value_source(Role::Brand) {
            ValueSource::Manual(value) => (Some(MANUAL_COLUMN.to_string()), Some(value)),
            ValueSource::Column(index) => (Some(column_index_to_letter(index)), None),
            ValueSource::Unmapped => (None, None),
        };

        Ok(Self {
            sheet_name: config.name.clone(),
            sheet_index: config.original_index + 1,
            header_row: config.header_index + 1,
            style_column,
            brand_column,
            manual_brand,
            image_column: config
                .image_column()
                .filter(|_| profile.allows_image_column())
                .map(column_index_to_letter),
            color_column: letter(Role::ColorName),
            category_column: letter(Role::Category),
            msrp_column: letter(Role::Msrp),
        })
    }
}

/// One submission per selected sheet, in workbook order. Fails on the first
/// selected sheet without a style column.
pub fn build_plan(
    configs: &[SheetConfig],
    profile: MappingProfile,
) -> SheetResult<Vec<SheetSubmission>> {
    configs
        .iter()
        .filter(|config| config.is_selected)
        .map(|config| SheetSubmission::from_config(config, profile))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, Sheet};
    use crate::sheet::LoadOptions;
    use assert_matches::assert_matches;

    fn config(name: &str, index: usize) -> SheetConfig {
        let grid = vec![
            vec![
                Some(CellValue::from("Image")),
                Some(CellValue::from("Style")),
                Some(CellValue::from("Brand")),
                Some(CellValue::from("Color")),
            ],
            vec![
                Some(CellValue::from("https://cdn.example.com/1.jpg")),
                Some(CellValue::from("S-1")),
                Some(CellValue::from("Nike")),
                Some(CellValue::from("Red")),
            ],
        ];
        SheetConfig::from_sheet(&Sheet::new(name, grid), index, LoadOptions::default())
    }

    #[test]
    fn plan_covers_selected_sheets_only() {
        let first = config("Shoes", 0)
            .with_mapping(Role::Style, 1)
            .unwrap()
            .with_mapping(Role::Brand, 2)
            .unwrap()
            .with_mapping(Role::ColorName, 3)
            .unwrap();
        let second = config("Hats", 1);
        assert!(!second.is_selected);

        let plan = build_plan(&[first, second], MappingProfile::GoogleImages).unwrap();
        assert_eq!(plan.len(), 1);
        let job = &plan[0];
        assert_eq!(job.sheet_name, "Shoes");
        assert_eq!(job.sheet_index, 1);
        assert_eq!(job.header_row, 1);
        assert_eq!(job.style_column, "B");
        assert_eq!(job.brand_column.as_deref(), Some("C"));
        assert_eq!(job.manual_brand, None);
        assert_eq!(job.color_column.as_deref(), Some("D"));
        assert_eq!(job.image_column.as_deref(), Some("A"));
        assert_eq!(job.category_column, None);
    }

    #[test]
    fn manual_brand_is_submitted_as_marker() {
        let config = config("Shoes", 0)
            .with_mapping(Role::Style, 1)
            .unwrap()
            .with_mapping(Role::Brand, 2)
            .unwrap()
            .with_manual_value("Acme")
            .unwrap();
        let job = SheetSubmission::from_config(&config, MappingProfile::default()).unwrap();
        assert_eq!(job.brand_column.as_deref(), Some(MANUAL_COLUMN));
        assert_eq!(job.manual_brand.as_deref(), Some("Acme"));
    }

    #[test]
    fn missing_style_fails_the_plan() {
        let config = config("Shoes", 0);
        assert_matches!(
            build_plan(&[config], MappingProfile::default()),
            Err(SheetError::MissingRequiredRole { role: Role::Style, .. })
        );
    }

    #[test]
    fn msrp_only_jobs_carry_no_image_column() {
        let config = config("Shoes", 0)
            .with_mapping(Role::Style, 1)
            .unwrap()
            .with_mapping(Role::ReadImage, 0)
            .unwrap();
        let job = SheetSubmission::from_config(&config, MappingProfile::MsrpOnly).unwrap();
        assert_eq!(job.image_column, None);
        let job = SheetSubmission::from_config(&config, MappingProfile::ImagesOnly).unwrap();
        assert_eq!(job.image_column.as_deref(), Some("A"));
    }

    #[test]
    fn serializes_camel_case() {
        let config = config("Shoes", 0).with_mapping(Role::Style, 1).unwrap();
        let job = SheetSubmission::from_config(&config, MappingProfile::default()).unwrap();
        let json = serde_json::to_value(job).unwrap();
        assert_eq!(json["styleColumn"], "B");
        assert_eq!(json["headerRow"], 1);
    }
}
