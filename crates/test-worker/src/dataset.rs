use std::sync::Arc;

/// One row of the product dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct SkuRecord {
    /// The SKU, e.g. `CHD-N70-2512`.
    pub material_code: String,
    /// Short description of the material.
    pub material_description: String,
    /// Long description with every attribute, if available.
    pub description: Option<String>,
    /// Fat content in grams.
    pub fat: Option<f64>,
    /// Product type, e.g. `Chocolate`.
    pub product_type: String,
    /// Chocolate base, e.g. `Dark`.
    pub base_type: String,
    /// Moulding type, e.g. `Callets`.
    pub moulding_type: String,
}

impl SkuRecord {
    /// Creates a record with empty attributes.
    pub fn new<C, D>(material_code: C, material_description: D) -> Self
    where
        C: Into<String>,
        D: Into<String>,
    {
        Self {
            material_code: material_code.into(),
            material_description: material_description.into(),
            description: None,
            fat: None,
            product_type: String::new(),
            base_type: String::new(),
            moulding_type: String::new(),
        }
    }

    /// Sets the fat content.
    pub fn with_fat(mut self, fat: f64) -> Self {
        self.fat = Some(fat);
        self
    }

    /// Sets the long description.
    pub fn with_description<S: Into<String>>(
        mut self,
        description: S,
    ) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the chocolate attributes.
    pub fn with_chocolate<P, B, M>(
        mut self,
        product_type: P,
        base_type: B,
        moulding_type: M,
    ) -> Self
    where
        P: Into<String>,
        B: Into<String>,
        M: Into<String>,
    {
        self.product_type = product_type.into();
        self.base_type = base_type.into();
        self.moulding_type = moulding_type.into();
        self
    }
}

/// An immutable snapshot of the product dataset.
///
/// Cloning is cheap, every clone shares the same rows.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    records: Arc<[SkuRecord]>,
}

impl Dataset {
    /// Creates a dataset from rows, keeping the first row of every SKU.
    pub fn new(records: impl IntoIterator<Item = SkuRecord>) -> Self {
        let mut unique: Vec<SkuRecord> = vec![];
        for record in records {
            if unique
                .iter()
                .all(|r| r.material_code != record.material_code)
            {
                unique.push(record);
            }
        }
        Self {
            records: unique.into(),
        }
    }

    /// A small dataset used by tests and demos.
    ///
    /// Three SKUs have more than 30g of fat, and there is no dark
    /// chocolate in callets.
    pub fn sample() -> Self {
        Self::new([
            SkuRecord::new("CHD-N70-2512", "Dark chocolate 70% blocks")
                .with_fat(42.5)
                .with_chocolate("Chocolate", "Dark", "Blocks 5kg")
                .with_description("Cocoa: 70.5% | Origin: Ghana"),
            SkuRecord::new("CHM-Q34-1187", "Milk chocolate callets")
                .with_fat(36.1)
                .with_chocolate("Chocolate", "Milk", "Callets"),
            SkuRecord::new("FIL-HZ-0042", "Hazelnut filling")
                .with_fat(31.0),
            SkuRecord::new("CHW-W28-0090", "White chocolate chips")
                .with_fat(30.0)
                .with_chocolate(
                    "Chocolate with < 5% Veg Fat",
                    "White",
                    "Chips",
                ),
            SkuRecord::new("CCP-LF-2211", "Low fat cocoa powder")
                .with_fat(11.0),
            SkuRecord::new("CHD-DR-7001", "Dark compound drops")
                .with_fat(28.4)
                .with_chocolate("Compound", "Dark", "Drops"),
        ])
    }

    /// Returns all rows.
    #[inline]
    pub fn records(&self) -> &[SkuRecord] {
        &self.records
    }
}
