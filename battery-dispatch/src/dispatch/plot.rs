use std::ops::Range;
use std::path::Path;

use dispatch_model::{DispatchSchedule, Horizon};
use plotters::prelude::*;
use tracing::info;

/// Smallest range covering every series, padded so flat series still get an axis.
pub fn value_range(series: &[&[f64]]) -> Range<f64> {
    let (min, max) = series
        .iter()
        .flat_map(|values| values.iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let padding = ((max - min) * 0.05).max(0.5);
    (min - padding)..(max + padding)
}

/// Plot the dispatch profile: power balance, battery output and state of charge
pub fn plot_dispatch(
    horizon: &Horizon,
    schedule: &DispatchSchedule,
    filename: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (900, 1100)).into_drawing_area();
    root.fill(&WHITE)?;

    let areas = root.split_evenly((3, 1));
    let upper = &areas[0];
    let middle = &areas[1];
    let lower = &areas[2];

    let steps = horizon.len() as f64;
    let net_load: Vec<f64> = horizon.iter().map(|step| step.net_load()).collect();
    let grid = schedule.grid();
    let batt_power = schedule.batt_power();
    let soc = schedule.soc();

    // Plot 1: net load against grid flow
    let mut chart1 = ChartBuilder::on(upper)
        .caption("Power Balance", ("sans-serif", 25))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..steps, value_range(&[&net_load, &grid]))?;

    chart1
        .configure_mesh()
        .x_desc("Timestep")
        .y_desc("Power [kW]")
        .draw()?;

    chart1
        .draw_series(LineSeries::new(
            net_load.iter().enumerate().map(|(i, &y)| (i as f64, y)),
            &BLUE,
        ))?
        .label("Net load")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], &BLUE));

    chart1
        .draw_series(LineSeries::new(
            grid.iter().enumerate().map(|(i, &y)| (i as f64, y)),
            &RED,
        ))?
        .label("Grid")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], &RED));

    chart1.configure_series_labels().draw()?;

    // Plot 2: battery output, positive while discharging
    let mut chart2 = ChartBuilder::on(middle)
        .caption("Battery Output", ("sans-serif", 25))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..steps, value_range(&[&batt_power]))?;

    chart2
        .configure_mesh()
        .x_desc("Timestep")
        .y_desc("Power [kW]")
        .draw()?;

    chart2.draw_series(batt_power.iter().enumerate().map(|(i, &y)| {
        let color = if y >= 0.0 { GREEN } else { MAGENTA };
        Rectangle::new([(i as f64 + 0.1, 0.0), (i as f64 + 0.9, y)], color.filled())
    }))?;

    // Plot 3: state of charge
    let mut chart3 = ChartBuilder::on(lower)
        .caption("State of Charge", ("sans-serif", 25))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..steps, 0f64..1f64)?;

    chart3
        .configure_mesh()
        .x_desc("Timestep")
        .y_desc("SOC")
        .draw()?;

    chart3.draw_series(LineSeries::new(
        soc.iter().enumerate().map(|(i, &y)| (i as f64 + 1.0, y)),
        &BLACK,
    ))?;

    root.present()?;
    info!("Plot saved as {}", filename.display());
    Ok(())
}
