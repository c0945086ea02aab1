//! Manufacturing report variants and their fixed constants

/// Decimal places used when formatting each derived field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub net_weight: u32,
    pub total_materials: u32,
    pub nacl_content: u32,
    pub intermediate_water: u32,
    pub total_nacl_water: u32,
    pub final_nacl_water: u32,
    pub flow_rate: u32,
    pub grand_total: u32,
    pub yield_rate: u32,
}

impl Precision {
    const fn standard(final_nacl_water: u32) -> Self {
        Self {
            net_weight: 2,
            total_materials: 2,
            nacl_content: 2,
            intermediate_water: 2,
            total_nacl_water: 2,
            final_nacl_water,
            flow_rate: 0,
            grand_total: 2,
            yield_rate: 1,
        }
    }
}

/// A report template. Percentages are whole numbers (39.5 means 39.5%).
#[derive(Debug, Clone, PartialEq)]
pub struct FormVariant {
    pub code: &'static str,
    pub name: &'static str,
    pub std_mean_moisture_pct: f64,
    pub nacl_water_pct: f64,
    pub nacl_specific_gravity: f64,
    /// Container tare subtracted from every raw scale reading.
    pub tare_weight: f64,
    pub std_yield_weight: f64,
    /// Path prefix of the primary material weighing block.
    pub primary_material: &'static str,
    /// Input paths of the auxiliary raw materials added to the batch.
    pub auxiliary_materials: &'static [&'static str],
    pub precision: Precision,
}

pub const VARIANTS: &[FormVariant] = &[
    FormVariant {
        code: "BZ3",
        name: "BZ3 batch production report",
        std_mean_moisture_pct: 39.5,
        nacl_water_pct: 15.0,
        nacl_specific_gravity: 1.1,
        tare_weight: 22.5,
        std_yield_weight: 2200.0,
        primary_material: "rc417Weighting",
        auxiliary_materials: &[
            "rawMaterials.magnesiumHydroxide",
            "rawMaterials.activatedCarbon",
        ],
        precision: Precision::standard(1),
    },
    FormVariant {
        code: "BS3-A",
        name: "BS3-A batch production report",
        std_mean_moisture_pct: 38.0,
        nacl_water_pct: 15.0,
        nacl_specific_gravity: 1.1,
        tare_weight: 22.5,
        std_yield_weight: 2000.0,
        primary_material: "rc417Weighting",
        auxiliary_materials: &[
            "rawMaterials.magnesiumHydroxide",
            "rawMaterials.gypsumPlaster",
        ],
        precision: Precision::standard(1),
    },
    FormVariant {
        code: "BS3-B",
        name: "BS3-B batch production report",
        std_mean_moisture_pct: 41.0,
        nacl_water_pct: 20.0,
        nacl_specific_gravity: 1.15,
        tare_weight: 30.0,
        std_yield_weight: 1800.0,
        primary_material: "rc430Weighting",
        auxiliary_materials: &[
            "rawMaterials.gypsumPlaster",
            "rawMaterials.activatedCarbon",
            "rawMaterials.magnesiumHydroxide",
        ],
        precision: Precision::standard(0),
    },
];

impl FormVariant {
    /// Look up a variant by its exact code, ignoring surrounding whitespace.
    pub fn lookup(code: &str) -> Option<&'static FormVariant> {
        let code = code.trim();
        VARIANTS.iter().find(|v| v.code == code)
    }

    pub fn codes() -> impl Iterator<Item = &'static str> {
        VARIANTS.iter().map(|v| v.code)
    }

    /// Path of a weighing row field inside the primary material block.
    pub fn weighing_path(&self, row: usize, field: &str) -> String {
        format!("{}.row{}.{}", self.primary_material, row, field)
    }

    pub fn primary_total_path(&self) -> String {
        format!("{}.total", self.primary_material)
    }
}
