//! Derived field calculation for batch reports
//!
//! Every derived field is recomputed from the raw [`InputBag`] on each call.
//! Stages whose inputs are missing, non-numeric, or hit a zero denominator
//! come out as `None`, and only the stages depending on them follow; the
//! rest of the report still computes. Values stay unrounded between stages
//! and are rounded once, when the [`OutputBag`] is formatted.
use super::bag::{InputBag, OutputBag};
use super::variant::FormVariant;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Brine is dosed over a fixed window, in minutes.
pub const DOSING_MINUTES: f64 = 20.0;

const SINGULARITY_EPSILON: f64 = 1e-9;

/// Number of weighing rows in the primary material block.
pub const WEIGHING_ROWS: usize = 2;

pub mod paths {
    // inputs
    pub const RAW_WEIGHT: &str = "rawWeight";
    pub const TARE_WEIGHT: &str = "tareWeight";
    pub const WATER_CONTENT: &str = "brine.waterContent";
    pub const STD_MEAN_MOISTURE: &str = "brine.stdMeanMoisture";
    pub const NACL_WATER: &str = "brine.naclWater";
    pub const NACL_SPECIFIC_GRAVITY: &str = "brine.naclSpecificGravity";
    pub const REWORK_QUANTITY: &str = "ncr.quantity";
    pub const PACKED_WEIGHT: &str = "packing.actualWeight";

    // outputs
    pub const NET_WEIGHT: &str = "netWeight";
    pub const TOTAL_MATERIALS: &str = "rawMaterials.totalWeight";
    pub const NACL_CONTENT: &str = "brine.naclContent";
    pub const INTERMEDIATE_WATER: &str = "brine.intermediateWater";
    pub const TOTAL_NACL_WATER: &str = "brine.totalNaclWater";
    pub const FINAL_NACL_WATER: &str = "brine.finalNaclWater";
    pub const FLOW_RATE: &str = "brine.flowRate";
    pub const GRAND_TOTAL: &str = "summary.grandTotal";
    pub const YIELD_RATE: &str = "packing.yieldRate";
}

/// Unrounded stages B to E of the brine dosing calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrineChain {
    /// Stage B: NaCl carried by the dose.
    pub nacl_content: f64,
    /// Stage C: water carried by the dose.
    pub intermediate_water: f64,
    /// Stage D: total brine dose by weight.
    pub total_nacl_water: f64,
    /// Stage E: dose volume, `None` without a usable specific gravity.
    pub final_nacl_water: Option<f64>,
    pub flow_rate: Option<f64>,
}

/// Percentages feeding the brine chain, as whole numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrineParams {
    pub water_content_pct: f64,
    pub std_mean_moisture_pct: f64,
    pub nacl_water_pct: f64,
    pub specific_gravity: Option<f64>,
}

/// Every derived value of one report, before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub net_weights: [Option<f64>; WEIGHING_ROWS],
    pub primary_total: Option<f64>,
    pub total_materials: Option<f64>,
    pub brine: Option<BrineChain>,
    pub grand_total: Option<f64>,
    pub yield_rate: Option<f64>,
}

/// Net weight of a single weighing. Readings at or below the tare are not
/// weighed yet rather than negative.
pub fn net_weight(raw_reading: Option<f64>, tare: f64) -> Option<f64> {
    let net = raw_reading? - tare;
    (net > 0.0).then_some(net)
}

/// Sum of the valid rows, `None` if no row has been weighed.
pub fn weighing_total(nets: &[Option<f64>]) -> Option<f64> {
    nets.iter().flatten().copied().reduce(|a, b| a + b)
}

/// Primary total plus every auxiliary quantity; absent auxiliaries count as 0.
pub fn total_materials(primary_total: Option<f64>, auxiliaries: &[Option<f64>]) -> Option<f64> {
    let auxiliary_sum: f64 = auxiliaries.iter().map(|q| q.unwrap_or(0.0)).sum();
    Some(primary_total? + auxiliary_sum)
}

pub fn brine_chain(
    total_materials: f64,
    primary_total: f64,
    params: &BrineParams,
) -> Option<BrineChain> {
    let water = params.water_content_pct / 100.0;
    let moisture = params.std_mean_moisture_pct / 100.0;
    let nacl = params.nacl_water_pct / 100.0;

    let denominator = 1.0 - nacl - moisture;
    if denominator.abs() < SINGULARITY_EPSILON || nacl.abs() < SINGULARITY_EPSILON {
        return None;
    }

    let numerator = total_materials * moisture - primary_total * water;
    let nacl_content = numerator / denominator * nacl;
    let intermediate_water = nacl_content / nacl * (1.0 - nacl);
    let total_nacl_water = nacl_content + intermediate_water;

    let final_nacl_water = params
        .specific_gravity
        .filter(|sg| *sg > 0.0)
        .map(|sg| total_nacl_water / sg);
    let flow_rate = final_nacl_water.map(|volume| volume / DOSING_MINUTES);

    Some(BrineChain {
        nacl_content,
        intermediate_water,
        total_nacl_water,
        final_nacl_water,
        flow_rate,
    })
}

/// Compute every stage for `inputs` under `variant`'s constants.
pub fn evaluate(inputs: &InputBag, variant: &FormVariant) -> Calculation {
    let mut net_weights = [None; WEIGHING_ROWS];
    for (index, slot) in net_weights.iter_mut().enumerate() {
        let row = index + 1;
        let raw = inputs.number(&variant.weighing_path(row, paths::RAW_WEIGHT));
        let tare = inputs
            .number(&variant.weighing_path(row, paths::TARE_WEIGHT))
            .unwrap_or(variant.tare_weight);
        *slot = net_weight(raw, tare);
    }
    let primary_total = weighing_total(&net_weights);

    let auxiliaries: Vec<Option<f64>> = variant
        .auxiliary_materials
        .iter()
        .map(|path| inputs.number(path))
        .collect();
    let total_materials = total_materials(primary_total, &auxiliaries);

    let brine = match (total_materials, primary_total, inputs.number(paths::WATER_CONTENT)) {
        (Some(total), Some(primary), Some(water_content_pct)) => {
            let params = BrineParams {
                water_content_pct,
                std_mean_moisture_pct: inputs
                    .number(paths::STD_MEAN_MOISTURE)
                    .unwrap_or(variant.std_mean_moisture_pct),
                nacl_water_pct: inputs
                    .number(paths::NACL_WATER)
                    .unwrap_or(variant.nacl_water_pct),
                specific_gravity: Some(
                    inputs
                        .number(paths::NACL_SPECIFIC_GRAVITY)
                        .unwrap_or(variant.nacl_specific_gravity),
                ),
            };
            brine_chain(total, primary, &params)
        }
        _ => None,
    };

    let rework = inputs.number(paths::REWORK_QUANTITY).unwrap_or(0.0);
    let grand_total = match (total_materials, brine) {
        (Some(total), Some(chain)) => Some(total + chain.total_nacl_water + rework),
        _ => None,
    };

    let yield_rate = inputs
        .number(paths::PACKED_WEIGHT)
        .filter(|w| *w > 0.0)
        .filter(|_| variant.std_yield_weight > 0.0)
        .map(|w| w / variant.std_yield_weight * 100.0);

    Calculation {
        net_weights,
        primary_total,
        total_materials,
        brine,
        grand_total,
        yield_rate,
    }
}

/// Round half away from zero and render exactly `places` fraction digits.
pub fn format_fixed(value: Option<f64>, places: u32) -> Option<String> {
    let mut decimal = Decimal::from_f64(value?)?
        .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    if decimal.is_zero() {
        decimal.set_sign_positive(true);
    }
    decimal.rescale(places);
    Some(decimal.to_string())
}

impl Calculation {
    pub fn to_output_bag(&self, variant: &FormVariant) -> OutputBag {
        let precision = &variant.precision;
        let mut out = OutputBag::new();

        for (index, net) in self.net_weights.iter().enumerate() {
            out.insert(
                &variant.weighing_path(index + 1, paths::NET_WEIGHT),
                format_fixed(*net, precision.net_weight),
            );
        }
        out.insert(
            &variant.primary_total_path(),
            format_fixed(self.primary_total, precision.net_weight),
        );
        out.insert(
            paths::TOTAL_MATERIALS,
            format_fixed(self.total_materials, precision.total_materials),
        );

        let brine = self.brine.as_ref();
        out.insert(
            paths::NACL_CONTENT,
            format_fixed(brine.map(|b| b.nacl_content), precision.nacl_content),
        );
        out.insert(
            paths::INTERMEDIATE_WATER,
            format_fixed(brine.map(|b| b.intermediate_water), precision.intermediate_water),
        );
        out.insert(
            paths::TOTAL_NACL_WATER,
            format_fixed(brine.map(|b| b.total_nacl_water), precision.total_nacl_water),
        );
        out.insert(
            paths::FINAL_NACL_WATER,
            format_fixed(brine.and_then(|b| b.final_nacl_water), precision.final_nacl_water),
        );
        out.insert(
            paths::FLOW_RATE,
            format_fixed(brine.and_then(|b| b.flow_rate), precision.flow_rate),
        );

        out.insert(
            paths::GRAND_TOTAL,
            format_fixed(self.grand_total, precision.grand_total),
        );
        out.insert(
            paths::YIELD_RATE,
            format_fixed(self.yield_rate, precision.yield_rate),
        );
        out
    }
}

/// Derive the full output bag for one report.
pub fn compute_outputs(inputs: &InputBag, variant: &FormVariant) -> OutputBag {
    evaluate(inputs, variant).to_output_bag(variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bz3() -> &'static FormVariant {
        FormVariant::lookup("BZ3").unwrap()
    }

    // rows net to 500 each against the 22.5 BZ3 tare
    fn bz3_batch() -> InputBag {
        InputBag::new()
            .set("rc417Weighting.row1.rawWeight", 522.5)
            .set("rc417Weighting.row2.rawWeight", "522.5")
            .set("rawMaterials.magnesiumHydroxide", 50.0)
            .set("rawMaterials.activatedCarbon", 20.0)
            .set(paths::WATER_CONTENT, 2.0)
            .set(paths::REWORK_QUANTITY, 300.0)
    }

    fn close(value: Option<&str>, expected: f64) -> bool {
        value
            .and_then(|v| v.parse::<f64>().ok())
            .is_some_and(|v| (v - expected).abs() <= 0.01)
    }

    #[test]
    fn bz3_reference_batch() {
        let out = compute_outputs(&bz3_batch(), bz3());

        assert_eq!(out.get("rc417Weighting.row1.netWeight"), Some("500.00"));
        assert_eq!(out.get("rc417Weighting.total"), Some("1000.00"));
        assert_eq!(out.get(paths::TOTAL_MATERIALS), Some("1070.00"));
        assert!(close(out.get(paths::TOTAL_NACL_WATER), 884.95));
        assert!(close(out.get(paths::FINAL_NACL_WATER), 804.5));
        assert_eq!(out.get(paths::FLOW_RATE), Some("40"));
        assert!(close(out.get(paths::GRAND_TOTAL), 2254.95));
    }

    #[test]
    fn stage_d_is_carried_unrounded() {
        let calc = evaluate(&bz3_batch(), bz3());
        let chain = calc.brine.unwrap();

        let expected = (1070.0 * 0.395 - 1000.0 * 0.02) / (1.0 - 0.15 - 0.395);
        assert!((chain.total_nacl_water - expected).abs() < 1e-6);
        assert!((chain.nacl_content + chain.intermediate_water - chain.total_nacl_water).abs() < 1e-9);
        let volume = chain.final_nacl_water.unwrap();
        assert!((volume - chain.total_nacl_water / 1.1).abs() < 1e-9);
        assert!((calc.grand_total.unwrap() - (1070.0 + chain.total_nacl_water + 300.0)).abs() < 1e-9);
    }

    #[test]
    fn net_weight_clamps_at_tare() {
        assert_eq!(net_weight(Some(22.5), 22.5), None);
        assert_eq!(net_weight(Some(10.0), 22.5), None);
        assert_eq!(net_weight(Some(0.0), 0.0), None);
        assert_eq!(net_weight(None, 22.5), None);
        assert_eq!(net_weight(Some(100.25), 22.5), Some(100.25 - 22.5));
    }

    #[test]
    fn weighing_total_needs_one_valid_row() {
        assert_eq!(weighing_total(&[None, None]), None);
        assert_eq!(weighing_total(&[None, Some(4.0)]), Some(4.0));
        assert_eq!(weighing_total(&[Some(1.5), Some(4.0)]), Some(5.5));
    }

    #[test]
    fn singular_denominator_nulls_brine_only() {
        let inputs = bz3_batch()
            .set(paths::STD_MEAN_MOISTURE, 85.0)
            .set(paths::NACL_WATER, 15.0);
        let out = compute_outputs(&inputs, bz3());

        assert_eq!(out.get(paths::TOTAL_MATERIALS), Some("1070.00"));
        for path in [
            paths::NACL_CONTENT,
            paths::INTERMEDIATE_WATER,
            paths::TOTAL_NACL_WATER,
            paths::FINAL_NACL_WATER,
            paths::FLOW_RATE,
            paths::GRAND_TOTAL,
        ] {
            assert!(out.is_null(path), "{path} should be null");
        }
    }

    #[test]
    fn missing_specific_gravity_only_nulls_stage_e() {
        let inputs = bz3_batch().set(paths::NACL_SPECIFIC_GRAVITY, 0.0);
        let out = compute_outputs(&inputs, bz3());

        assert!(out.get(paths::TOTAL_NACL_WATER).is_some());
        assert!(out.get(paths::GRAND_TOTAL).is_some());
        assert!(out.is_null(paths::FINAL_NACL_WATER));
        assert!(out.is_null(paths::FLOW_RATE));
    }

    #[test]
    fn yield_rate_uses_standard_yield_weight() {
        let inputs = InputBag::new().set(paths::PACKED_WEIGHT, 2090.0);
        let out = compute_outputs(&inputs, bz3());

        assert_eq!(out.get(paths::YIELD_RATE), Some("95.0"));
        assert!(out.is_null(paths::TOTAL_MATERIALS));
    }

    #[test]
    fn format_fixed_rounds_half_away_from_zero() {
        assert_eq!(format_fixed(Some(1070.0), 2).as_deref(), Some("1070.00"));
        assert_eq!(format_fixed(Some(0.125), 2).as_deref(), Some("0.13"));
        assert_eq!(format_fixed(Some(40.5), 0).as_deref(), Some("41"));
        assert_eq!(format_fixed(Some(-0.001), 2).as_deref(), Some("0.00"));
        assert_eq!(format_fixed(Some(f64::NAN), 2), None);
        assert_eq!(format_fixed(None, 2), None);
    }
}
