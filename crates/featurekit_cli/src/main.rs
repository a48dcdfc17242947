//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `featurekit_core` linkage and print its version.
//! - Replay a short scripted navigation with two demo features so the
//!   activation, observation and teardown paths can be checked by eye.
//!
//! Usage: `featurekit_cli [config.json]`

use featurekit_core::{
    init_logging, path_matches, BoxError, ElementSpec, Event, FeatureDefinition, NavigationReport,
    NodeId, Runtime, RuntimeConfig,
};
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("featurekit_core version={}", featurekit_core::core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("featurekit_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    init_logging(&config.logging())?;

    let mut runtime = Runtime::with_config(config)?;
    runtime.add_feature(reviews_tab()?)?;
    runtime.add_feature(copy_changes()?)?;

    print_report("pull", &runtime.navigate("https://github.com/octo/demo/pull/7")?);

    let header = runtime.document().borrow_mut().append_built(
        NodeId::DOCUMENT,
        &ElementSpec::new("nav")
            .class("tabnav-tabs")
            .child(ElementSpec::new("a").class("tabnav-tab").text("Conversation")),
    )?;
    runtime.run_until_idle();
    info!("event=demo_render module=cli status=ok element={}", header);

    print_report("files", &runtime.navigate("https://github.com/octo/demo/pull/7/files")?);
    let file = runtime.document().borrow_mut().append_built(
        NodeId::DOCUMENT,
        &ElementSpec::new("div")
            .class("file")
            .child(ElementSpec::new("div").class("file-header").text("src/lib.rs")),
    )?;
    runtime.run_until_idle();

    let button = {
        let document = runtime.document().borrow();
        let found = document
            .descendants(file)
            .find(|node| document.has_class(*node, "rgh-copy-changes"));
        found
    };
    if let Some(button) = button {
        let handled = runtime.dispatch(&Event::new("click", button));
        println!("click handled_by={handled}");
    }

    print_report("home", &runtime.navigate("https://github.com/octo/demo")?);
    println!(
        "after teardown registrations={} listeners={}",
        runtime.observer().registration_count(),
        runtime.events().listener_count()
    );
    runtime.shutdown();
    Ok(())
}

/// Adds a "Reviews" tab once the pull request tab bar exists.
fn reviews_tab() -> Result<FeatureDefinition, regex::Error> {
    Ok(FeatureDefinition::new("reviews-tab")
        .include(path_matches(r"^/[^/]+/[^/]+/pull/\d+")?)
        .init(|context| {
            let ready = context.element_ready(".tabnav-tabs")?;
            let document = context.document().clone();
            context.spawn_cancellable(async move {
                if let Some(tabs) = ready.await {
                    document
                        .borrow_mut()
                        .append_built(
                            tabs,
                            &ElementSpec::new("a").class("tabnav-tab").text("Reviews"),
                        )?;
                    println!("reviews-tab: tab added under {tabs}");
                }
                Ok::<(), BoxError>(())
            });
            Ok(())
        }))
}

/// Adds a copy button to every file header on the files tab.
fn copy_changes() -> Result<FeatureDefinition, regex::Error> {
    Ok(FeatureDefinition::new("copy-changes")
        .include(path_matches(r"/pull/\d+/files$")?)
        .init(|context| {
            context.observe(".file-header", |document, header| {
                let result = document.borrow_mut().append_built(
                    header,
                    &ElementSpec::new("button").class("rgh-copy-changes").text("Copy changes"),
                );
                if let Err(err) = result {
                    log::warn!("event=copy_button module=cli status=error error={err}");
                }
            })?;
            context.delegate("button.rgh-copy-changes", "click", |event| {
                let text = event.document.borrow().text_content(event.delegate_target);
                println!("copy-changes: clicked `{text}`");
                event.event.prevent_default();
            })?;
            Ok(())
        }))
}

fn print_report(step: &str, report: &NavigationReport) {
    println!(
        "{step}: activated={:?} deactivated={:?} retained={:?} failed={}",
        report.activated,
        report.deactivated,
        report.retained,
        report.failed.len()
    );
}
