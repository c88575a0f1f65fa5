//! Test runner implementation
//!
//! Executes a scenario end to end: scratch interfaces, the daemon with
//! its console, a protocol client on the control socket, then the
//! steps. Match failures are deferred and reported together; protocol
//! and parse errors abort the run.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::common::{Config, Error, Result};
use crate::rib::{self, NexthopSpec, RouteSpecs, RouteTable};
use crate::session::{Console, Requirement};
use crate::system::{self, DummyIface};
use crate::zserv::{Nexthop, Route, ZservClient};

use super::config::{NexthopConfig, RouteConfig, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub failures: Vec<String>,
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(path: &Path, config: &Config, verbose: bool) -> Result<TestResult> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;

    let scenario: TestScenario = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))?;

    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    // The whole harness needs root: interfaces, daemon, control socket
    let root = Requirement::root();
    if !root.satisfied() {
        println!("  {} {}", "skipped:".yellow(), root.message());
        return Ok(TestResult {
            name: scenario.name,
            passed: false,
            steps_run: 0,
            steps_total,
            failures: vec![root.message().to_string()],
        });
    }

    // Scratch interfaces, in scenario order
    println!("\n{}", "Setup:".cyan());
    let mut ifaces = Vec::new();
    for interface in &scenario.interfaces {
        let iface = DummyIface::create().await?;
        if interface.up {
            iface.up().await?;
        }
        for addr in &interface.addrs {
            iface.addr_add(addr).await?;
        }
        println!(
            "  {} interface {} ({})",
            "✓".green(),
            iface.name(),
            interface.addrs.join(", ").dimmed()
        );
        ifaces.push(iface);
    }

    // The daemon and its console
    let mut console = Console::start(
        &scenario.daemon.program.to_string_lossy(),
        &scenario.daemon.args,
        &scenario.daemon.prompt,
        &config.timeouts,
    )
    .await?;
    if !scenario.daemon.config.is_empty() {
        console.configure(&scenario.daemon.config).await?;
    }
    println!(
        "  {} daemon {}",
        "✓".green(),
        scenario.daemon.program.display().to_string().dimmed()
    );

    // The injecting client
    let tables = Arc::new(config.protocol.clone());
    let route_type = tables.route_type(&scenario.client.route_type)?;
    let connected = match &scenario.client.socket {
        Some(socket) => ZservClient::connect_to(socket, tables.clone(), route_type).await,
        None => ZservClient::connect(tables.clone(), route_type).await,
    };
    let mut client = match connected {
        Ok(client) => client,
        Err(e) => {
            console.terminate().await;
            return Err(e);
        }
    };
    println!(
        "  {} client connected as {}",
        "✓".green(),
        scenario.client.route_type.dimmed()
    );

    // Execute test steps
    println!("\n{}", "Steps:".cyan());

    let settle = Duration::from_millis(config.timeouts.settle_ms);
    let mut failures = Vec::new();
    let mut steps_run = 0;

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;
        steps_run = step_num;

        let outcome = execute_step(
            step,
            &mut console,
            &mut client,
            &ifaces,
            settle,
            step_num,
            verbose,
        )
        .await;

        match outcome {
            Ok(()) => {}
            // A failed match is recorded and the run continues
            Err(Error::MatchFailure {
                message,
                expected,
                observed,
            }) => {
                println!("  {} Step {}: {}", "✗".red(), step_num, message);
                if verbose {
                    println!("{}", "    expected:".dimmed());
                    for line in expected.lines() {
                        println!("    {}", line.dimmed());
                    }
                    println!("{}", "    observed:".dimmed());
                    for line in observed.lines() {
                        println!("    {}", line.dimmed());
                    }
                }
                failures.push(format!("step {}: {}", step_num, message));
            }
            // Everything else aborts the scenario
            Err(e) => {
                println!("  {} Step {}: {}", "✗".red(), step_num, e);
                console.terminate().await;
                cleanup(ifaces).await;
                return Ok(TestResult {
                    name: scenario.name.clone(),
                    passed: false,
                    steps_run: step_num,
                    steps_total,
                    failures: vec![format!("step {}: {}", step_num, e)],
                });
            }
        }
    }

    console.terminate().await;
    cleanup(ifaces).await;

    let passed = failures.is_empty();
    if passed {
        println!("\n{} {}\n", "✓".green().bold(), "Test Passed".green().bold());
    } else {
        println!(
            "\n{} {} ({} failed checks)\n",
            "✗".red().bold(),
            "Test Failed".red().bold(),
            failures.len()
        );
    }

    Ok(TestResult {
        name: scenario.name,
        passed,
        steps_run,
        steps_total,
        failures,
    })
}

async fn cleanup(ifaces: Vec<DummyIface>) {
    for iface in ifaces {
        if let Err(e) = iface.delete().await {
            tracing::warn!(%e, "failed to remove scratch interface");
        }
    }
}

/// Execute a single test step
#[allow(clippy::too_many_arguments)]
async fn execute_step(
    step: &TestStep,
    console: &mut Console,
    client: &mut ZservClient,
    ifaces: &[DummyIface],
    settle: Duration,
    step_num: usize,
    verbose: bool,
) -> Result<()> {
    match step {
        TestStep::Inject { route } => {
            let route = build_route(route, client, ifaces)?;
            client.add_route(&route).await?;
            tokio::time::sleep(settle).await;
            println!(
                "  {} Step {}: inject {}",
                "✓".green(),
                step_num,
                route.dest.to_string().dimmed()
            );
            Ok(())
        }
        TestStep::Withdraw { route } => {
            let route = build_route(route, client, ifaces)?;
            client.delete_route(&route).await?;
            tokio::time::sleep(settle).await;
            println!(
                "  {} Step {}: withdraw {}",
                "✓".green(),
                step_num,
                route.dest.to_string().dimmed()
            );
            Ok(())
        }
        TestStep::ExpectRib {
            protocol,
            family,
            routes,
        } => {
            let code = client.tables().route_code(protocol)?;
            let table = console.protocol_rib(code, *family).await?;
            if verbose {
                println!("  observed {} {} routes", table.len(), protocol.dimmed());
            }
            let expected = resolve_placeholders(routes, ifaces)?;
            rib::match_routes(&expected, &table)?;
            println!(
                "  {} Step {}: {} routes match ({} checked)",
                "✓".green(),
                step_num,
                protocol.dimmed(),
                expected.len()
            );
            Ok(())
        }
        TestStep::ExpectRibAbsent {
            protocol,
            family,
            prefix,
        } => {
            let code = client.tables().route_code(protocol)?;
            let table = console.protocol_rib(code, *family).await?;
            expect_absent(prefix, &table)?;
            println!(
                "  {} Step {}: {} absent from {} routes",
                "✓".green(),
                step_num,
                prefix.dimmed(),
                protocol.dimmed()
            );
            Ok(())
        }
        TestStep::ExpectFib { family, routes } => {
            let table = system::fib(*family).await?;
            let expected = resolve_placeholders(routes, ifaces)?;
            rib::match_routes(&expected, &table)?;
            println!(
                "  {} Step {}: kernel routes match ({} checked)",
                "✓".green(),
                step_num,
                expected.len()
            );
            Ok(())
        }
        TestStep::ExpectFibAbsent { family, prefix } => {
            let table = system::fib(*family).await?;
            expect_absent(prefix, &table)?;
            println!(
                "  {} Step {}: {} absent from kernel routes",
                "✓".green(),
                step_num,
                prefix.dimmed()
            );
            Ok(())
        }
        TestStep::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            println!("  {} Step {}: sleep {}ms", "✓".green(), step_num, ms);
            Ok(())
        }
    }
}

fn expect_absent(prefix: &str, table: &RouteTable) -> Result<()> {
    if table.contains_key(prefix) {
        return Err(Error::MatchFailure {
            message: format!("route {} is present but expected absent", prefix),
            expected: String::new(),
            observed: serde_json::to_string_pretty(table).unwrap_or_default(),
        });
    }
    Ok(())
}

/// Turn a route definition into a wire route
fn build_route(
    config: &RouteConfig,
    client: &ZservClient,
    ifaces: &[DummyIface],
) -> Result<Route> {
    let dest = config
        .prefix
        .parse()
        .map_err(|e| Error::Config(format!("Bad prefix '{}': {}", config.prefix, e)))?;

    let mut route = client.new_route(dest);
    if let Some(name) = &config.route_type {
        route.route_type = client.tables().route_type(name)?;
    }
    route.distance = config.distance;
    route.metric = config.metric;

    for nexthop in &config.nexthops {
        route.add_nexthop(build_nexthop(nexthop, ifaces)?)?;
    }
    Ok(route)
}

fn build_nexthop(config: &NexthopConfig, ifaces: &[DummyIface]) -> Result<Nexthop> {
    let ifindex = match config.iface {
        Some(position) => Some(
            ifaces
                .get(position)
                .map(|iface| iface.index())
                .ok_or_else(|| {
                    Error::Config(format!("No scenario interface at position {}", position))
                })?,
        ),
        None => None,
    };

    match (config.gate, ifindex) {
        (Some(gate), Some(ifindex)) => Ok(Nexthop::via(gate, ifindex)),
        (Some(gate), None) => Ok(Nexthop::gateway(gate)),
        (None, Some(ifindex)) => Ok(Nexthop::direct(ifindex)),
        (None, None) => Err(Error::Config(
            "A nexthop needs a gate, an interface, or both".to_string(),
        )),
    }
}

/// Replace `$ifaceN` placeholders with the allocated interface names
fn resolve_placeholders(specs: &RouteSpecs, ifaces: &[DummyIface]) -> Result<RouteSpecs> {
    let mut resolved = specs.clone();
    for spec in resolved.values_mut() {
        if let Some(nexthops) = &mut spec.nexthops {
            for nexthop in nexthops {
                resolve_nexthop(nexthop, ifaces)?;
            }
        }
    }
    Ok(resolved)
}

fn resolve_nexthop(spec: &mut NexthopSpec, ifaces: &[DummyIface]) -> Result<()> {
    if let Some(Some(name)) = &mut spec.iface {
        if let Some(position) = name.strip_prefix("$iface") {
            let position: usize = position.parse().map_err(|_| {
                Error::Config(format!("Bad interface placeholder '{}'", name))
            })?;
            *name = ifaces
                .get(position)
                .map(|iface| iface.name().to_string())
                .ok_or_else(|| {
                    Error::Config(format!("No scenario interface at position {}", position))
                })?;
        }
    }
    if let Some(resolved) = &mut spec.resolved {
        for nexthop in resolved {
            resolve_nexthop(nexthop, ifaces)?;
        }
    }
    Ok(())
}
