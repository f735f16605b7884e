use console::Style;
use lucida_core::compute::ZeroGuard;
use lucida_core::psf::PsfModel;

use crate::job::JobConfig;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_job_summary(job: &JobConfig, device_name: &str) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Lucida Deconvolution"));
    println!(
        "  {}",
        s.title
            .apply_to("\u{2550}".repeat("Lucida Deconvolution".len()))
    );
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(job.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(job.output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Device"),
        s.method.apply_to(device_name)
    );
    if let Some(ref preview) = job.preview {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Preview"),
            s.path.apply_to(preview.display())
        );
    }
    println!();

    println!("  {}", s.header.apply_to("PSF"));
    if let Some(ref path) = job.psf_file {
        println!(
            "    {:<12}{}",
            s.label.apply_to("File"),
            s.path.apply_to(path.display())
        );
    } else if let Some(model) = job.psf_model {
        print_psf_model(&s, model);
    }
    println!();

    println!("  {}", s.header.apply_to("Iteration"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Count"),
        s.value.apply_to(job.deconvolution.iterations)
    );
    print_zero_guard(&s, job.deconvolution.zero_guard);
    match job.deconvolution.degeneracy_threshold {
        Some(threshold) => println!(
            "    {:<12}{}",
            s.label.apply_to("Degeneracy"),
            s.value.apply_to(format!("fail above {threshold}"))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Degeneracy"),
            s.disabled.apply_to("never fails")
        ),
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("First guess"),
        s.value
            .apply_to(format!("{:?}", job.first_guess).to_lowercase())
    );
    println!();
}

fn print_psf_model(s: &Styles, model: PsfModel) {
    match model {
        PsfModel::Gaussian {
            sigma_lateral,
            sigma_axial,
        } => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Model"),
                s.method.apply_to("gaussian")
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("Sigma xy"),
                s.value.apply_to(format!("{sigma_lateral} vx"))
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("Sigma z"),
                s.value.apply_to(format!("{sigma_axial} vx"))
            );
        }
        PsfModel::Delta => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Model"),
                s.method.apply_to("delta")
            );
        }
    }
}

fn print_zero_guard(s: &Styles, guard: ZeroGuard) {
    match guard {
        ZeroGuard::Disabled => println!(
            "    {:<12}{}",
            s.label.apply_to("Zero guard"),
            s.disabled.apply_to("disabled")
        ),
        ZeroGuard::ClampToZero { epsilon } => println!(
            "    {:<12}{}",
            s.label.apply_to("Zero guard"),
            s.value.apply_to(format!("clamp to zero below {epsilon}"))
        ),
        ZeroGuard::Floor { epsilon } => println!(
            "    {:<12}{}",
            s.label.apply_to("Zero guard"),
            s.value.apply_to(format!("floor denominator at {epsilon}"))
        ),
    }
}
