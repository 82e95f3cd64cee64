use crate::commands::MatrixArgs;
use crate::output;

use clap::Args;
use color_eyre::Result;

use crossbuild_service::MatrixExpander;

/// List the matrix cells with their base image and output path
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let config = args.matrix.resolve()?;
    let cells = MatrixExpander::expand(&config.parameters());

    output::header(&format!(
        "{} cells, exporting to {}",
        cells.len(),
        config.output_destination.display()
    ));

    for group in MatrixExpander::group_by_toolchain(cells) {
        let image = crossbuild_service::execution::matrix::base_environment_ref(
            &config.image_template,
            &group.toolchain_version,
        );
        output::toolchain_header(&group.toolchain_version, &image, group.cells.len());

        for cell in &group.cells {
            let path = cell.output_path(config.output_layout);
            output::plan_cell(
                &cell.os,
                &cell.arch,
                &path,
                &config.build_command_for(&path).join(" "),
            );
        }
    }

    Ok(())
}
