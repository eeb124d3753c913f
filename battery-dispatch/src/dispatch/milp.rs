use std::time::{Duration, Instant};

use dispatch_model::{DispatchInput, DispatchRecord, DispatchSchedule, SolveStatus};
use good_lp::solvers::lp_solvers::{CbcSolver, LpSolver};
use good_lp::solvers::{SolutionStatus, WithMipGap, WithTimeLimit};
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, Solver, SolverModel, Variable,
    constraint, highs, scip, variable,
};
use tracing::{debug, info, warn};

use crate::config::{SolverBackend, SolverConfig};
use crate::error::DispatchError;

/// Decision variables created per timestep.
const VARIABLES_PER_STEP: usize = 6;
/// Constraints emitted per timestep.
const CONSTRAINTS_PER_STEP: usize = 11;

struct DispatchVariables {
    grid: Vec<Variable>,
    batt_power: Vec<Variable>,
    charge: Vec<Variable>,
    discharge: Vec<Variable>,
    charge_status: Vec<Variable>,
    soc: Vec<Variable>,
}

impl DispatchVariables {
    fn new(problem: &mut ProblemVariables, steps: usize) -> Self {
        let mut vars = Self {
            grid: Vec::with_capacity(steps),
            batt_power: Vec::with_capacity(steps),
            charge: Vec::with_capacity(steps),
            discharge: Vec::with_capacity(steps),
            charge_status: Vec::with_capacity(steps),
            soc: Vec::with_capacity(steps),
        };

        for t in 0..steps {
            // grid and batt_power are free; the constraints give them their range
            vars.grid.push(problem.add(variable().name(format!("grid_{t}"))));
            vars.batt_power
                .push(problem.add(variable().name(format!("batt_power_{t}"))));
            vars.charge
                .push(problem.add(variable().max(0.0).name(format!("charge_{t}"))));
            vars.discharge
                .push(problem.add(variable().min(0.0).name(format!("discharge_{t}"))));
            vars.charge_status
                .push(problem.add(variable().binary().name(format!("charge_status_{t}"))));
            vars.soc
                .push(problem.add(variable().min(0.0).max(1.0).name(format!("soc_{t}"))));
        }

        vars
    }

    fn len(&self) -> usize {
        self.grid.len() * VARIABLES_PER_STEP
    }
}

/// Total energy cost over the horizon: `sum(grid * price * dt)`.
fn generate_objective(input: &DispatchInput, vars: &DispatchVariables) -> Expression {
    let dt = input.horizon.dt_hours();
    let mut objective = Expression::default();
    for (t, step) in input.horizon.iter().enumerate() {
        objective += vars.grid[t] * (step.price * dt);
    }
    objective
}

/// Adds the per-timestep grid, battery and state-of-charge constraints.
fn add_time_dependent_constraints<M>(
    mut model: M,
    input: &DispatchInput,
    vars: &DispatchVariables,
) -> M
where
    M: SolverModel,
{
    let grid = &input.grid;
    let battery = &input.battery;
    let dt = input.horizon.dt_hours();
    let charge_factor = battery.charge_soc_factor(dt);
    let discharge_factor = battery.discharge_soc_factor(dt);

    for (t, step) in input.horizon.iter().enumerate() {
        let net_load = step.net_load();

        // Grid balance: grid = load - solar - wind - batt_power
        model = model.with(constraint!(vars.grid[t] + vars.batt_power[t] == net_load));

        // Grid-side buy/sell limits
        model = model.with(constraint!(vars.grid[t] <= grid.max_buy_power));
        model = model.with(constraint!(vars.grid[t] >= -grid.max_sell_power));

        // Site-level limits on net_load - (discharge + charge); independent of the buy/sell limits
        model = model.with(constraint!(
            vars.discharge[t] + vars.charge[t] >= net_load - grid.max_import_power
        ));
        model = model.with(constraint!(
            vars.discharge[t] + vars.charge[t] <= net_load + grid.max_export_power
        ));

        model = model.with(constraint!(
            vars.batt_power[t] == vars.charge[t] + vars.discharge[t]
        ));

        // charge_status = 1 opens the charge bound and pins discharge to 0, and vice versa
        model = model.with(constraint!(
            vars.charge[t] + battery.max_charge_rate * vars.charge_status[t] >= 0.0
        ));
        model = model.with(constraint!(
            vars.discharge[t] + battery.max_discharge_rate * vars.charge_status[t]
                <= battery.max_discharge_rate
        ));

        // soc[t] = soc[t-1] - dt/capacity * (charge * (1 - charge_eff) + discharge / (1 - discharge_eff))
        let soc_change = charge_factor * vars.charge[t] + discharge_factor * vars.discharge[t];
        if t == 0 {
            model = model.with(constraint!(vars.soc[t] + soc_change == battery.initial_soc));
        } else {
            model = model.with(constraint!(
                vars.soc[t] - vars.soc[t - 1] + soc_change == 0.0
            ));
        }

        model = model.with(constraint!(vars.soc[t] >= battery.min_soc));
        model = model.with(constraint!(vars.soc[t] <= battery.max_soc));
    }

    model
}

fn build_model<S: Solver>(input: &DispatchInput, solver: S) -> (S::Model, DispatchVariables) {
    let mut problem = ProblemVariables::new();
    let vars = DispatchVariables::new(&mut problem, input.horizon.len());
    let objective = generate_objective(input, &vars);
    let model = problem.minimise(objective).using(solver);
    let model = add_time_dependent_constraints(model, input, &vars);
    (model, vars)
}

/// Maps how the solver stopped onto the status reported with the schedule.
fn solve_status(status: SolutionStatus) -> SolveStatus {
    match status {
        SolutionStatus::Optimal => SolveStatus::Optimal,
        SolutionStatus::TimeLimit => SolveStatus::TimeLimited,
        SolutionStatus::GapLimit => SolveStatus::GapLimited,
    }
}

/// Hands the configured time limit and relative MIP gap to the solver.
fn apply_limits<M>(mut model: M, config: &SolverConfig) -> Result<M, DispatchError>
where
    M: WithTimeLimit + WithMipGap,
{
    if let Some(secs) = config.time_limit_secs {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(DispatchError::SolverOption(format!(
                "time limit must be a positive number of seconds, got {secs}"
            )));
        }
        model = model.with_time_limit(secs);
    }
    if let Some(gap) = config.mip_gap {
        model = model
            .with_mip_gap(gap as f32)
            .map_err(|e| DispatchError::SolverOption(format!("mip gap {gap}: {e:?}")))?;
    }
    Ok(model)
}

/// Reads the solved values back into a schedule. The objective is recomputed from the
/// unrounded grid values.
fn format_solution_results(
    solution: &dyn Solution,
    input: &DispatchInput,
    vars: &DispatchVariables,
    status: SolveStatus,
    solve_time: Duration,
) -> DispatchSchedule {
    let dt = input.horizon.dt_hours();
    let records: Vec<DispatchRecord> = (0..input.horizon.len())
        .map(|t| DispatchRecord {
            grid: solution.value(vars.grid[t]),
            batt_power: solution.value(vars.batt_power[t]),
            charge: solution.value(vars.charge[t]),
            discharge: solution.value(vars.discharge[t]),
            soc: solution.value(vars.soc[t]),
            charge_status: u8::from(solution.value(vars.charge_status[t]) > 0.5),
        })
        .collect();

    let objective = records
        .iter()
        .zip(input.horizon.iter())
        .map(|(record, step)| record.grid * step.price * dt)
        .sum();

    DispatchSchedule {
        status,
        objective,
        records,
        num_variables: vars.len(),
        num_constraints: CONSTRAINTS_PER_STEP * input.horizon.len(),
        solve_time_ms: solve_time.as_millis() as u64,
    }
}

fn run_model<M>(
    model: M,
    input: &DispatchInput,
    vars: &DispatchVariables,
) -> Result<DispatchSchedule, DispatchError>
where
    M: SolverModel<Error = ResolutionError>,
{
    debug!(
        steps = input.horizon.len(),
        variables = vars.len(),
        constraints = CONSTRAINTS_PER_STEP * input.horizon.len(),
        "dispatch model assembled"
    );

    let start_time = Instant::now();
    let opt_result = model.solve();
    let solve_time = start_time.elapsed();

    match opt_result {
        Ok(solution) => {
            let status = solve_status(solution.status());
            if !status.is_optimal() {
                warn!(%status, "schedule is feasible but not proven optimal");
            }
            let schedule = format_solution_results(&solution, input, vars, status, solve_time);
            info!(
                status = %schedule.status,
                objective = schedule.objective,
                solve_time_ms = schedule.solve_time_ms,
                "dispatch solved"
            );
            Ok(schedule)
        }
        Err(e) => {
            warn!(error = %e, "dispatch solve failed");
            Err(e.into())
        }
    }
}

/// Builds the dispatch model for the whole horizon and solves it once with the configured
/// backend and limits.
pub fn solve_dispatch(
    input: &DispatchInput,
    config: &SolverConfig,
) -> Result<DispatchSchedule, DispatchError> {
    input.validate()?;

    match config.backend {
        SolverBackend::Highs => {
            let (mut model, vars) = build_model(input, highs);
            model.set_verbose(config.verbose);
            run_model(apply_limits(model, config)?, input, &vars)
        }
        SolverBackend::Scip => {
            let (model, vars) = build_model(input, scip);
            run_model(apply_limits(model, config)?, input, &vars)
        }
        SolverBackend::Cbc => {
            let (model, vars) = build_model(input, LpSolver(CbcSolver::new()));
            run_model(apply_limits(model, config)?, input, &vars)
        }
    }
}

/// Same model as [`solve_dispatch`], solved with any `good_lp` solver as configured by the
/// caller.
pub fn solve_dispatch_with<S>(
    input: &DispatchInput,
    solver: S,
) -> Result<DispatchSchedule, DispatchError>
where
    S: Solver,
    S::Model: SolverModel<Error = ResolutionError>,
{
    input.validate()?;
    let (model, vars) = build_model(input, solver);
    run_model(model, input, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_model::{BatteryParameters, GridParameters, Horizon, Timestep};

    const TOL: f64 = 1e-5;

    fn open_grid() -> GridParameters {
        GridParameters {
            max_buy_power: 100.0,
            max_sell_power: 100.0,
            max_import_power: 100.0,
            max_export_power: 100.0,
        }
    }

    fn lossless_battery(initial_soc: f64) -> BatteryParameters {
        BatteryParameters {
            max_charge_rate: 5.0,
            max_discharge_rate: 5.0,
            capacity: 10.0,
            charge_eff: 0.0,
            discharge_eff: 0.0,
            min_soc: 0.0,
            max_soc: 1.0,
            initial_soc,
        }
    }

    fn input(
        dt: f64,
        steps: Vec<Timestep>,
        grid: GridParameters,
        battery: BatteryParameters,
    ) -> DispatchInput {
        DispatchInput::new(Horizon::new(dt, steps).unwrap(), grid, battery)
    }

    fn solve(input: &DispatchInput) -> DispatchSchedule {
        solve_dispatch(input, &SolverConfig::default()).unwrap()
    }

    /// Checks every structural property a solved schedule must satisfy.
    fn assert_schedule_properties(input: &DispatchInput, schedule: &DispatchSchedule) {
        let battery = &input.battery;
        let grid = &input.grid;
        let dt = input.horizon.dt_hours();
        assert_eq!(schedule.len(), input.horizon.len());

        let mut previous_soc = battery.initial_soc;
        for (t, (record, step)) in schedule.records.iter().zip(input.horizon.iter()).enumerate() {
            assert!(
                (record.batt_power - (record.charge + record.discharge)).abs() < TOL,
                "step {t}: batt_power != charge + discharge"
            );
            assert!(
                (record.grid - (step.net_load() - record.batt_power)).abs() < TOL,
                "step {t}: grid balance violated"
            );
            assert!(record.soc >= battery.min_soc - TOL, "step {t}: soc below min");
            assert!(record.soc <= battery.max_soc + TOL, "step {t}: soc above max");
            assert!(
                record.charge.abs() < 1e-4 || record.discharge.abs() < 1e-4,
                "step {t}: charging and discharging at once"
            );
            assert!(record.charge <= TOL && record.discharge >= -TOL);
            assert!(record.grid <= grid.max_buy_power + TOL);
            assert!(record.grid >= -grid.max_sell_power - TOL);
            let residual = step.net_load() - (record.discharge + record.charge);
            assert!(residual <= grid.max_import_power + TOL);
            assert!(residual >= -grid.max_export_power - TOL);

            let expected_soc = battery.next_soc(previous_soc, record.charge, record.discharge, dt);
            assert!(
                (record.soc - expected_soc).abs() < TOL,
                "step {t}: soc recursion mismatch ({} vs {expected_soc})",
                record.soc
            );
            previous_soc = record.soc;
        }

        let recomputed: f64 = schedule
            .records
            .iter()
            .zip(input.horizon.iter())
            .map(|(record, step)| record.grid * step.price * dt)
            .sum();
        assert!((schedule.objective - recomputed).abs() < 1e-9);

        let from_rounded: f64 = schedule
            .rounded_records(4)
            .iter()
            .zip(input.horizon.iter())
            .map(|(record, step)| record.grid * step.price * dt)
            .sum();
        assert!((schedule.objective - from_rounded).abs() < 1e-2);
    }

    #[test]
    fn test_single_step_with_disabled_battery() {
        let battery = BatteryParameters {
            max_charge_rate: 0.0,
            max_discharge_rate: 0.0,
            ..lossless_battery(0.5)
        };
        let input = input(1.0, vec![Timestep::new(10.0, 0.0, 0.0, 1.0)], open_grid(), battery);

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        let record = schedule.records[0];
        assert!(record.charge.abs() < TOL);
        assert!(record.discharge.abs() < TOL);
        assert!(record.batt_power.abs() < TOL);
        assert!((record.grid - 10.0).abs() < TOL);
        assert!((schedule.objective - 10.0).abs() < TOL);
        assert_eq!(schedule.status, SolveStatus::Optimal);
        assert_eq!(schedule.num_variables, 6);
        assert_eq!(schedule.num_constraints, 11);
    }

    #[test]
    fn test_inverted_soc_bounds_are_infeasible() {
        let battery = BatteryParameters {
            min_soc: 0.9,
            max_soc: 0.8,
            ..lossless_battery(0.85)
        };
        let input = input(
            1.0,
            vec![Timestep::new(10.0, 0.0, 0.0, 1.0); 3],
            open_grid(),
            battery,
        );

        let result = solve_dispatch(&input, &SolverConfig::default());
        assert!(matches!(result, Err(DispatchError::Infeasible)), "{result:?}");
    }

    #[test]
    fn test_price_spread_charges_then_discharges() {
        let input = input(
            1.0,
            vec![
                Timestep::new(0.0, 0.0, 0.0, 0.0),
                Timestep::new(0.0, 0.0, 0.0, 10.0),
            ],
            open_grid(),
            lossless_battery(0.0),
        );

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        let (first, second) = (schedule.records[0], schedule.records[1]);
        assert!(first.charge < -TOL);
        assert!((first.charge + 5.0).abs() < TOL);
        assert!(second.discharge > TOL);
        assert!((second.discharge - 5.0).abs() < TOL);
        assert!(first.soc > input.battery.initial_soc);
        assert!(first.is_charging());
        assert!(!second.is_charging());
        assert!(schedule.objective < input.horizon.baseline_cost());
        assert!((schedule.objective + 50.0).abs() < TOL);
    }

    #[test]
    fn test_lossless_round_trip_restores_soc() {
        let input = input(
            1.0,
            vec![
                Timestep::new(0.0, 0.0, 0.0, 0.0),
                Timestep::new(0.0, 0.0, 0.0, 10.0),
            ],
            open_grid(),
            lossless_battery(0.0),
        );

        let schedule = solve(&input);

        // 5 kW in, then 5 kW out: back to where it started
        assert!((schedule.records[0].soc - 0.5).abs() < TOL);
        assert!((schedule.records[1].soc - input.battery.initial_soc).abs() < TOL);
    }

    #[test]
    fn test_lossy_schedule_satisfies_recursion() {
        let battery = BatteryParameters {
            max_charge_rate: 4.0,
            max_discharge_rate: 3.0,
            capacity: 12.0,
            charge_eff: 0.05,
            discharge_eff: 0.08,
            min_soc: 0.2,
            max_soc: 0.9,
            initial_soc: 0.5,
        };
        let steps = vec![
            Timestep::new(6.0, 1.0, 0.0, 12.0),
            Timestep::new(5.0, 2.0, 0.0, 3.0),
            Timestep::new(4.0, 1.0, 3.0, 2.0),
            Timestep::new(7.0, 0.5, 2.0, 20.0),
            Timestep::new(9.0, 0.0, 0.0, 25.0),
            Timestep::new(3.0, 0.0, 0.0, 5.0),
        ];
        let input = input(0.5, steps, open_grid(), battery);

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        assert!(schedule.objective <= input.horizon.baseline_cost() + TOL);
        assert_eq!(schedule.num_variables, 36);
        assert_eq!(schedule.num_constraints, 66);
    }

    #[test]
    fn test_site_import_limit_binds_independently_of_buy_limit() {
        // Negative price: the cheapest plan buys as much as possible, but the residual
        // import limit forces 4 kW of discharge.
        let grid = GridParameters {
            max_import_power: 6.0,
            ..open_grid()
        };
        let input = input(
            1.0,
            vec![Timestep::new(10.0, 0.0, 0.0, -1.0)],
            grid,
            lossless_battery(0.5),
        );

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        assert!((schedule.records[0].discharge - 4.0).abs() < TOL);
        assert!((schedule.records[0].grid - 6.0).abs() < TOL);
    }

    #[test]
    fn test_buy_limit_binds_independently_of_import_limit() {
        let grid = GridParameters {
            max_buy_power: 7.0,
            ..open_grid()
        };
        let input = input(
            1.0,
            vec![Timestep::new(10.0, 0.0, 0.0, -1.0)],
            grid,
            lossless_battery(0.5),
        );

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        assert!((schedule.records[0].discharge - 3.0).abs() < TOL);
        assert!((schedule.records[0].grid - 7.0).abs() < TOL);
    }

    #[test]
    fn test_sell_limit_forces_charging() {
        // Surplus of 10 kW at a positive price: selling is worth it, but only 7 kW may leave
        // through the grid connection.
        let grid = GridParameters {
            max_sell_power: 7.0,
            ..open_grid()
        };
        let input = input(
            1.0,
            vec![Timestep::new(0.0, 10.0, 0.0, 1.0)],
            grid,
            lossless_battery(0.5),
        );

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        assert!((schedule.records[0].charge + 3.0).abs() < TOL);
        assert!((schedule.records[0].grid + 7.0).abs() < TOL);
        assert!(schedule.records[0].is_charging());
    }

    #[test]
    fn test_site_export_limit_forces_charging() {
        let grid = GridParameters {
            max_export_power: 6.0,
            ..open_grid()
        };
        let input = input(
            1.0,
            vec![Timestep::new(0.0, 10.0, 0.0, 1.0)],
            grid,
            lossless_battery(0.5),
        );

        let schedule = solve(&input);

        assert_schedule_properties(&input, &schedule);
        assert!((schedule.records[0].charge + 4.0).abs() < TOL);
        assert!((schedule.records[0].grid + 6.0).abs() < TOL);
    }

    #[test]
    fn test_surplus_generation_is_exported() {
        let input = input(
            1.0,
            vec![Timestep::new(2.0, 5.0, 4.0, 1.0)],
            open_grid(),
            BatteryParameters {
                max_charge_rate: 0.0,
                max_discharge_rate: 0.0,
                ..lossless_battery(0.5)
            },
        );

        let schedule = solve(&input);

        assert!((schedule.records[0].grid + 7.0).abs() < TOL);
        assert!((schedule.objective + 7.0).abs() < TOL);
    }

    #[test]
    fn test_invalid_input_rejected_before_solve() {
        let battery = BatteryParameters {
            discharge_eff: 1.0,
            ..lossless_battery(0.5)
        };
        let input = input(1.0, vec![Timestep::new(1.0, 0.0, 0.0, 1.0)], open_grid(), battery);

        let result = solve_dispatch(&input, &SolverConfig::default());
        assert!(matches!(result, Err(DispatchError::Invalid(_))), "{result:?}");
    }

    fn price_spread() -> DispatchInput {
        input(
            1.0,
            vec![
                Timestep::new(0.0, 0.0, 0.0, 0.0),
                Timestep::new(0.0, 0.0, 0.0, 10.0),
            ],
            open_grid(),
            lossless_battery(0.0),
        )
    }

    #[test]
    fn test_highs_limits_are_accepted() {
        let input = price_spread();
        let config = SolverConfig {
            time_limit_secs: Some(60.0),
            mip_gap: Some(1e-6),
            verbose: false,
            ..Default::default()
        };

        let schedule = solve_dispatch(&input, &config).unwrap();

        // a model this small is closed well within both limits
        assert_eq!(schedule.status, SolveStatus::Optimal);
        assert!((schedule.objective + 50.0).abs() < TOL);
    }

    #[test]
    fn test_invalid_limits_rejected_before_solve() {
        let input = price_spread();

        let negative_gap = SolverConfig {
            mip_gap: Some(-0.1),
            ..Default::default()
        };
        let result = solve_dispatch(&input, &negative_gap);
        assert!(matches!(result, Err(DispatchError::SolverOption(_))), "{result:?}");

        let zero_time = SolverConfig {
            time_limit_secs: Some(0.0),
            ..Default::default()
        };
        let result = solve_dispatch(&input, &zero_time);
        assert!(matches!(result, Err(DispatchError::SolverOption(_))), "{result:?}");
    }

    #[test]
    fn test_generic_solver_entry_point() {
        let input = input(
            1.0,
            vec![Timestep::new(10.0, 0.0, 0.0, 1.0)],
            open_grid(),
            lossless_battery(0.0),
        );

        let schedule = solve_dispatch_with(&input, good_lp::highs).unwrap();

        assert_schedule_properties(&input, &schedule);
        assert!((schedule.objective - 10.0).abs() < TOL);
    }

    #[test]
    fn test_solve_status_follows_solver_termination() {
        assert_eq!(solve_status(SolutionStatus::Optimal), SolveStatus::Optimal);
        assert_eq!(solve_status(SolutionStatus::TimeLimit), SolveStatus::TimeLimited);
        assert_eq!(solve_status(SolutionStatus::GapLimit), SolveStatus::GapLimited);
    }
}
