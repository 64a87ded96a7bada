use crate::problem::NllsProblem;
use crate::solver::SolverOptions;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// Outcome of one Levenberg–Marquardt run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub evaluations: usize,
    /// `0.5 * ‖r‖²` at the returned parameters.
    pub objective: f64,
    pub converged: bool,
    pub termination: String,
}

#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl LmBackend {
    pub fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        opts: &SolverOptions,
    ) -> (DVector<f64>, LmOutcome) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper {
            problem,
            params: x0,
        };
        let (wrapper, report) = lm.minimize(wrapper);

        // A step that cannot lower the cost any further is a minimum as far as
        // the tolerances are concerned.
        let converged = match report.termination {
            TerminationReason::NoImprovementPossible(_) => true,
            ref other => other.was_successful(),
        };

        (
            wrapper.params(),
            LmOutcome {
                evaluations: report.number_of_evaluations,
                objective: report.objective_function,
                converged,
                termination: format!("{:?}", report.termination),
            },
        )
    }
}
