//! Named per-row calculations over event-store branches.
//!
//! A [`Calculation`] pairs a pure function with the branch names it reads.
//! Calculations are identified by name: two calculations with the same name
//! are treated as the same quantity everywhere in the pipeline.

use std::fmt;
use std::sync::Arc;

use eop_store::{EventBatch, Formula};

use crate::error::{FillError, Result};

type CalcFn<T> = dyn Fn(&EventBatch) -> eop_store::Result<Vec<T>> + Send + Sync;
type WeightFn = dyn Fn(&EventBatch, bool, &str) -> eop_store::Result<Vec<f64>> + Send + Sync;

/// A named function of a batch producing one value per row.
pub struct Calculation<T> {
    name: String,
    branches: Vec<String>,
    func: Arc<CalcFn<T>>,
}

/// A calculation producing a numeric value per row.
pub type Variable = Calculation<f64>;

/// A calculation producing a pass/fail flag per row.
pub type Selection = Calculation<bool>;

impl<T> Clone for Calculation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            branches: self.branches.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> fmt::Debug for Calculation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calculation")
            .field("name", &self.name)
            .field("branches", &self.branches)
            .finish_non_exhaustive()
    }
}

impl<T> Calculation<T> {
    /// Wrap `func`, which may read only the listed `branches`.
    pub fn new<I, S, F>(name: impl Into<String>, branches: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&EventBatch) -> eop_store::Result<Vec<T>> + Send + Sync + 'static,
    {
        let mut declared: Vec<String> = Vec::new();
        for b in branches {
            let b = b.into();
            if !declared.contains(&b) {
                declared.push(b);
            }
        }
        Self { name: name.into(), branches: declared, func: Arc::new(func) }
    }

    /// Build a calculation from a template function and one to three
    /// parameters.
    ///
    /// The name is `base` followed by the parameters joined with `_`, so
    /// `("trkNClusters", ["100", "200"])` is named `trkNClusters100_200`.
    pub fn parametrized<A, I, S, F>(base: &str, args: &[A], branches: I, func: F) -> Result<Self>
    where
        A: fmt::Display + Clone + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&EventBatch, &[A]) -> eop_store::Result<Vec<T>> + Send + Sync + 'static,
    {
        if args.is_empty() || args.len() > 3 {
            return Err(FillError::Configuration(format!(
                "template '{base}' takes one to three parameters, got {}",
                args.len()
            )));
        }
        let suffix = args.iter().map(ToString::to_string).collect::<Vec<_>>().join("_");
        let bound = args.to_vec();
        Ok(Self::new(format!("{base}{suffix}"), branches, move |batch| func(batch, &bound)))
    }

    /// Same function and branches under another name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Unique name of this calculation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Branches that must be read before evaluation.
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// Evaluate over `batch`.
    ///
    /// Fails if a declared branch is missing or if the function returns a
    /// value count different from the batch length.
    pub fn eval(&self, batch: &EventBatch) -> Result<Vec<T>> {
        for branch in &self.branches {
            batch.column(branch)?;
        }
        let values = (self.func)(batch)?;
        if values.len() != batch.len() {
            return Err(FillError::LengthMismatch {
                name: self.name.clone(),
                expected: batch.len(),
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

impl Variable {
    /// Read one branch unchanged; the calculation is named after the branch.
    pub fn branch(name: &str) -> Self {
        let branch = name.to_string();
        Self::new(name, [name], move |batch| Ok(batch.column(&branch)?.to_vec()))
    }

    /// Compile a formula string into a variable.
    pub fn formula(name: impl Into<String>, expression: &str) -> Result<Self> {
        let formula = Formula::compile(expression)?;
        let branches = formula.required_branches.clone();
        Ok(Self::new(name, branches, move |batch| formula.eval(batch)))
    }
}

impl Selection {
    /// Compile a formula string into a selection (rows pass where the value is `> 0`).
    pub fn formula(name: impl Into<String>, expression: &str) -> Result<Self> {
        let formula = Formula::compile(expression)?;
        let branches = formula.required_branches.clone();
        Ok(Self::new(name, branches, move |batch| formula.eval_mask(batch)))
    }

    /// Rows passing every selection in `selections`.
    pub fn all_of(selections: &[Selection], name: Option<&str>) -> Self {
        let parts = selections.to_vec();
        Self::new(combined_name(selections, name), union_branches(selections), move |batch| {
            let mut mask = vec![true; batch.len()];
            for sel in &parts {
                for (m, pass) in mask.iter_mut().zip((sel.func)(batch)?) {
                    *m &= pass;
                }
            }
            Ok(mask)
        })
    }

    /// Rows passing none of `selections`: the logical inverse of their OR.
    pub fn none_of(selections: &[Selection], name: Option<&str>) -> Self {
        let parts = selections.to_vec();
        Self::new(combined_name(selections, name), union_branches(selections), move |batch| {
            let mut any = vec![false; batch.len()];
            for sel in &parts {
                for (m, pass) in any.iter_mut().zip((sel.func)(batch)?) {
                    *m |= pass;
                }
            }
            Ok(any.into_iter().map(|hit| !hit).collect())
        })
    }
}

fn combined_name(selections: &[Selection], name: Option<&str>) -> String {
    match name {
        Some(n) => n.to_string(),
        None => selections.iter().map(Selection::name).collect::<Vec<_>>().join("_"),
    }
}

fn union_branches(selections: &[Selection]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for b in selections.iter().flat_map(|s| s.branches.iter()) {
        if !out.contains(b) {
            out.push(b.clone());
        }
    }
    out
}

/// Per-row base weight, which may depend on whether the file is data and on
/// the channel being read.
#[derive(Clone)]
pub struct WeightCalculation {
    branches: Vec<String>,
    func: Arc<WeightFn>,
}

impl fmt::Debug for WeightCalculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightCalculation")
            .field("branches", &self.branches)
            .finish_non_exhaustive()
    }
}

impl WeightCalculation {
    /// Wrap `func(batch, is_data, channel)`.
    pub fn new<I, S, F>(branches: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&EventBatch, bool, &str) -> eop_store::Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self { branches: branches.into_iter().map(Into::into).collect(), func: Arc::new(func) }
    }

    /// Use `branch` as the generator weight for simulation and `1.0` for data.
    pub fn generator_weight(branch: &str) -> Self {
        let name = branch.to_string();
        Self::new([branch], move |batch, is_data, _channel| {
            if is_data { Ok(vec![1.0; batch.len()]) } else { Ok(batch.column(&name)?.to_vec()) }
        })
    }

    /// Branches read by the weight function.
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// Evaluate the base weight for `batch`.
    pub fn eval(&self, batch: &EventBatch, is_data: bool, channel: &str) -> Result<Vec<f64>> {
        let values = (self.func)(batch, is_data, channel)?;
        if values.len() != batch.len() {
            return Err(FillError::LengthMismatch {
                name: "weight".into(),
                expected: batch.len(),
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks() -> EventBatch {
        EventBatch::from_columns(vec![
            ("trk_p".to_string(), vec![1.0, 4.0, 9.0, 16.0]),
            ("trk_nTRT".to_string(), vec![5.0, 25.0, 30.0, 10.0]),
            ("trkWeight".to_string(), vec![0.5, 2.0, 1.5, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn branch_variable() {
        let v = Variable::branch("trk_p");
        assert_eq!(v.name(), "trk_p");
        assert_eq!(v.branches(), ["trk_p"]);
        assert_eq!(v.eval(&tracks()).unwrap(), vec![1.0, 4.0, 9.0, 16.0]);
    }

    #[test]
    fn formula_variable_and_selection() {
        let v = Variable::formula("sqrtP", "sqrt(trk_p)").unwrap();
        assert_eq!(v.eval(&tracks()).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        let s = Selection::formula("nTRT20", "trk_nTRT > 20").unwrap();
        assert_eq!(s.branches(), ["trk_nTRT"]);
        assert_eq!(s.eval(&tracks()).unwrap(), vec![false, true, true, false]);
    }

    #[test]
    fn declared_branch_must_exist() {
        let v = Variable::branch("trk_pt");
        assert!(matches!(v.eval(&tracks()).unwrap_err(), FillError::Store(_)));
    }

    #[test]
    fn wrong_output_length() {
        let v: Variable = Calculation::new("broken", Vec::<String>::new(), |_| Ok(vec![1.0]));
        let err = v.eval(&tracks()).unwrap_err();
        assert!(matches!(err, FillError::LengthMismatch { expected: 4, actual: 1, .. }));
    }

    #[test]
    fn duplicate_branches_collapsed() {
        let s = Selection::new("twice", ["trk_p", "trk_p", "trk_nTRT"], |b| {
            Ok(vec![true; b.len()])
        });
        assert_eq!(s.branches(), ["trk_p", "trk_nTRT"]);
    }

    #[test]
    fn parametrized_naming() {
        let s = Selection::parametrized("PGreater", &[2.5], ["trk_p"], |b, args| {
            Ok(b.column("trk_p")?.iter().map(|&p| p > args[0]).collect())
        })
        .unwrap();
        assert_eq!(s.name(), "PGreater2.5");
        assert_eq!(s.eval(&tracks()).unwrap(), vec![false, true, true, true]);

        let v = Variable::parametrized("Annulus", &["100", "200"], ["trk_p"], |b, _| {
            Ok(b.column("trk_p")?.to_vec())
        })
        .unwrap();
        assert_eq!(v.name(), "Annulus100_200");

        let none: &[f64] = &[];
        assert!(
            Selection::parametrized("X", none, ["trk_p"], |b, _| Ok(vec![true; b.len()])).is_err()
        );
        assert!(
            Selection::parametrized("X", &[1, 2, 3, 4], ["trk_p"], |b, _| Ok(vec![true; b.len()]))
                .is_err()
        );
    }

    #[test]
    fn inverse_and_conjunction() {
        let low_p = Selection::formula("LowP", "trk_p < 5").unwrap();
        let high_trt = Selection::formula("HighTRT", "trk_nTRT > 28").unwrap();
        let neither = Selection::none_of(&[low_p.clone(), high_trt.clone()], None);
        assert_eq!(neither.name(), "LowP_HighTRT");
        assert_eq!(neither.branches(), ["trk_p", "trk_nTRT"]);
        assert_eq!(neither.eval(&tracks()).unwrap(), vec![false, false, false, true]);

        let both = Selection::all_of(&[low_p, high_trt], Some("LowPHighTRT"));
        assert_eq!(both.name(), "LowPHighTRT");
        assert_eq!(both.eval(&tracks()).unwrap(), vec![false; 4]);
    }

    #[test]
    fn generator_weight_ignores_branch_for_data() {
        let w = WeightCalculation::generator_weight("trkWeight");
        assert_eq!(w.eval(&tracks(), false, "PythiaJetJet").unwrap(), vec![0.5, 2.0, 1.5, 1.0]);
        assert_eq!(w.eval(&tracks(), true, "LowMuData").unwrap(), vec![1.0; 4]);
    }
}
