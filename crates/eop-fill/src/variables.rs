//! Standard E/p track variables and selections.
//!
//! Cluster energies are summed within a cone of `dR < 0.2` unless the name
//! says otherwise; momenta and energies are in GeV.

use eop_store::EventBatch;

use crate::calculation::{Calculation, Selection, Variable, WeightCalculation};
use crate::error::{FillError, Result};

const CALIB_HIT_BRANCHES: [&str; 6] = [
    "trk_TotalPhotonBackgroundCalibHitEnergy_EM_200",
    "trk_TotalHadronicBackgroundCalibHitEnergy_EM_200",
    "trk_TotalCalibHitEnergy_EM_200",
    "trk_TotalPhotonBackgroundCalibHitEnergy_HAD_200",
    "trk_TotalHadronicBackgroundCalibHitEnergy_HAD_200",
    "trk_TotalCalibHitEnergy_HAD_200",
];

/// Cone sizes (in units of 0.01) with stored cluster energies.
pub const CONE_SIZES: [&str; 13] =
    ["000", "025", "050", "075", "100", "125", "150", "175", "200", "225", "250", "275", "300"];

fn zip_map<F>(batch: &EventBatch, names: &[&str], f: F) -> eop_store::Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let cols = names.iter().map(|n| batch.column(n)).collect::<eop_store::Result<Vec<_>>>()?;
    let mut row = vec![0.0; cols.len()];
    Ok((0..batch.len())
        .map(|i| {
            for (r, c) in row.iter_mut().zip(&cols) {
                *r = c[i];
            }
            f(&row)
        })
        .collect())
}

/// Track momentum.
pub fn trk_p() -> Variable {
    Variable::branch("trk_p").renamed("trkP")
}

/// Track transverse momentum.
pub fn trk_pt() -> Variable {
    Variable::branch("trk_pt").renamed("trkPt")
}

/// Track pseudorapidity at the interaction point.
pub fn trk_eta_id() -> Variable {
    Variable::branch("trk_etaID").renamed("trkEtaID")
}

/// `|eta|` at the interaction point.
pub fn trk_eta_id_abs() -> Variable {
    Calculation::new("trkEtaID_ABS", ["trk_etaID"], |b| {
        Ok(b.column("trk_etaID")?.iter().map(|e| e.abs()).collect())
    })
}

/// Number of TRT hits on the track.
pub fn n_trt() -> Variable {
    Variable::branch("trk_nTRT").renamed("nTRT")
}

/// Zero per track, for counting tracks with a one-bin histogram.
pub fn trk_count() -> Variable {
    Calculation::new("trkCount", Vec::<String>::new(), |b| Ok(vec![0.0; b.len()]))
}

/// `(E_EM + E_HAD) / p`.
pub fn eop() -> Variable {
    let names = ["trk_ClusterEnergy_EM_200", "trk_ClusterEnergy_HAD_200", "trk_p"];
    Calculation::new("EOP", names, move |b| zip_map(b, &names, |r| (r[0] + r[1]) / r[2]))
}

/// Background E/p from the EM annulus `0.1 < dR < 0.2`, scaled to the
/// `dR < 0.2` cone area.
pub fn eop_bkg() -> Variable {
    let names = ["trk_ClusterEnergy_EM_200", "trk_ClusterEnergy_EM_100", "trk_p"];
    let area = 0.2f64.powi(2) / (0.2f64.powi(2) - 0.1f64.powi(2));
    Calculation::new("EOPBkg", names, move |b| zip_map(b, &names, |r| area * (r[0] - r[1]) / r[2]))
}

/// Fraction of the cluster energy in the hadronic calorimeter.
pub fn had_frac() -> Variable {
    let names = ["trk_ClusterEnergy_EM_200", "trk_ClusterEnergy_HAD_200"];
    Calculation::new("HadFrac", names, move |b| zip_map(b, &names, |r| r[1] / (r[0] + r[1])))
}

/// Transverse cluster energy, `(E_EM + E_HAD) / cosh(eta)`.
pub fn transverse_energy() -> Variable {
    let names = ["trk_ClusterEnergy_EM_200", "trk_ClusterEnergy_HAD_200", "trk_etaID"];
    Calculation::new("TransverseEnergy", names, move |b| {
        zip_map(b, &names, |r| (r[0] + r[1]) / r[2].cosh())
    })
}

/// EM + HAD cluster energy between two cones, e.g. `("100", "200")`.
///
/// Cones are named as in [`CONE_SIZES`]; inner cones below `0.25` count as
/// empty.
pub fn total_energy_annulus(min_cone: &str, max_cone: &str) -> Result<Variable> {
    for cone in [min_cone, max_cone] {
        if !CONE_SIZES.contains(&cone) {
            return Err(FillError::Configuration(format!(
                "no cluster energies stored for cone '{cone}'"
            )));
        }
    }
    let (lo, hi) = (cone_value(min_cone), cone_value(max_cone));
    if lo >= hi {
        return Err(FillError::Configuration(format!(
            "cone '{min_cone}' is not inside '{max_cone}'"
        )));
    }
    let mut branches = vec![
        format!("trk_ClusterEnergy_EM_{max_cone}"),
        format!("trk_ClusterEnergy_HAD_{max_cone}"),
    ];
    if lo >= 25 {
        branches.push(format!("trk_ClusterEnergy_EM_{min_cone}"));
        branches.push(format!("trk_ClusterEnergy_HAD_{min_cone}"));
    }
    let read = branches.clone();
    let args = [min_cone.to_string(), max_cone.to_string()];
    Variable::parametrized("TotalEnergyAnnulus", &args, branches, move |b, _| {
        let names: Vec<&str> = read.iter().map(String::as_str).collect();
        zip_map(b, &names, |r| {
            let outer = r[0] + r[1];
            if r.len() == 4 { outer - (r[2] + r[3]) } else { outer }
        })
    })
}

fn cone_value(cone: &str) -> u32 {
    cone.parse().unwrap_or(0)
}

/// Tracks with any calibration-hit energy in the `dR < 0.2` cone.
pub fn has_calib_hit() -> Selection {
    Calculation::new("HasCalibHit", CALIB_HIT_BRANCHES, |b| {
        let total = zip_map(b, &CALIB_HIT_BRANCHES, |r| r.iter().sum())?;
        Ok(total.into_iter().map(|e| e > 0.0).collect())
    })
}

/// Tracks with `low < p < high`.
pub fn p_between(low: f64, high: f64) -> Result<Selection> {
    Selection::parametrized("PBetween", &[low, high], ["trk_p"], |b, args| {
        Ok(b.column("trk_p")?.iter().map(|&p| args[0] < p && p < args[1]).collect())
    })
}

/// Tracks with `low <= |eta| < high`.
pub fn eta_between(low: f64, high: f64) -> Result<Selection> {
    Selection::parametrized("EtaBetween", &[low, high], ["trk_etaID"], |b, args| {
        Ok(b.column("trk_etaID")?
            .iter()
            .map(|e| {
                let e = e.abs();
                args[0] <= e && e < args[1]
            })
            .collect())
    })
}

/// Generator weight from `trkWeight`; unit weight for data.
pub fn default_weight() -> WeightCalculation {
    WeightCalculation::generator_weight("trkWeight")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracks() -> EventBatch {
        EventBatch::from_columns(vec![
            ("trk_p".to_string(), vec![2.0, 4.0]),
            ("trk_etaID".to_string(), vec![-0.3, 1.2]),
            ("trk_ClusterEnergy_EM_100".to_string(), vec![0.5, 1.0]),
            ("trk_ClusterEnergy_EM_200".to_string(), vec![1.0, 2.0]),
            ("trk_ClusterEnergy_HAD_100".to_string(), vec![0.0, 0.5]),
            ("trk_ClusterEnergy_HAD_200".to_string(), vec![1.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn eop_and_background() {
        assert_eq!(eop().eval(&tracks()).unwrap(), vec![1.0, 0.75]);
        let bkg = eop_bkg().eval(&tracks()).unwrap();
        assert_relative_eq!(bkg[0], (4.0 / 3.0) * 0.5 / 2.0, max_relative = 1e-12);
        assert_eq!(had_frac().eval(&tracks()).unwrap(), vec![0.5, 1.0 / 3.0]);
    }

    #[test]
    fn eta_and_count() {
        assert_eq!(trk_eta_id_abs().eval(&tracks()).unwrap(), vec![0.3, 1.2]);
        assert_eq!(trk_count().eval(&tracks()).unwrap(), vec![0.0, 0.0]);
        assert!(trk_count().branches().is_empty());
        assert_eq!(trk_p().name(), "trkP");
        assert_eq!(trk_p().branches(), ["trk_p"]);
    }

    #[test]
    fn annulus() {
        let v = total_energy_annulus("100", "200").unwrap();
        assert_eq!(v.name(), "TotalEnergyAnnulus100_200");
        assert_eq!(v.eval(&tracks()).unwrap(), vec![1.5, 1.5]);
        let full = total_energy_annulus("000", "200").unwrap();
        assert_eq!(full.branches().len(), 2);
        assert_eq!(full.eval(&tracks()).unwrap(), vec![2.0, 3.0]);
        assert!(total_energy_annulus("200", "100").is_err());
        assert!(total_energy_annulus("010", "100").is_err());
    }

    #[test]
    fn range_selections() {
        assert_eq!(p_between(3.0, 5.0).unwrap().eval(&tracks()).unwrap(), vec![false, true]);
        let eta = eta_between(0.0, 0.6).unwrap();
        assert_eq!(eta.name(), "EtaBetween0_0.6");
        assert_eq!(eta.eval(&tracks()).unwrap(), vec![true, false]);
    }

    #[test]
    fn calib_hit_branches_required() {
        assert!(has_calib_hit().eval(&tracks()).is_err());
        let mut b = tracks();
        for (i, name) in CALIB_HIT_BRANCHES.iter().enumerate() {
            b.insert_column(*name, if i == 0 { vec![0.0, 0.2] } else { vec![0.0, 0.0] }).unwrap();
        }
        assert_eq!(has_calib_hit().eval(&b).unwrap(), vec![false, true]);
    }
}
