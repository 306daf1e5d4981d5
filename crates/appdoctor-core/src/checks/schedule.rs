//! Scheduler definitions and running queue workers.

use crate::app::Platform;
use crate::finding::{Findings, Level};

use super::CheckContext;

const CRON_ADVICE: &str = "Ensure cron is running: * * * * * cd /path-to-your-project && php artisan schedule:run >> /dev/null 2>&1";

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    check_schedule_definitions(ctx, out);
    check_workers(ctx, out).await;

    out.add(
        "Schedule & Queue Check Complete",
        Level::Ok,
        "Schedule and queue status validated successfully.",
    );
    Ok(())
}

fn check_schedule_definitions(ctx: &CheckContext<'_>, out: &mut Findings) {
    let layout = &ctx.snapshot.layout;
    let kernel = std::fs::read_to_string(layout.base_path("app/Console/Kernel.php")).ok();
    let console_routes = std::fs::read_to_string(layout.base_path("routes/console.php")).ok();

    if kernel.is_none() && console_routes.is_none() {
        out.add(
            "Console Kernel Not Found",
            Level::Info,
            "Neither app/Console/Kernel.php nor routes/console.php was found",
        );
        return;
    }

    if let Some(source) = kernel {
        if source.contains("protected function schedule") {
            out.add(
                "Schedule Method Found",
                Level::Info,
                "Schedule method exists in Console/Kernel.php",
            );
            if source.contains("$schedule->") {
                out.add(
                    "Scheduled Tasks Configured",
                    Level::Info,
                    format!("Found scheduled tasks in Kernel.php. {}", CRON_ADVICE),
                );
            }
        }
    }

    if let Some(source) = console_routes {
        if source.contains("Schedule::") {
            out.add(
                "Scheduled Tasks Configured",
                Level::Info,
                format!("Found scheduled tasks in routes/console.php. {}", CRON_ADVICE),
            );
        }
    }
}

/// Lines of a `ps aux` listing that belong to queue workers.
pub fn queue_worker_lines(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .filter(|line| line.contains("queue:work") && !line.contains("grep"))
        .collect()
}

async fn check_workers(ctx: &CheckContext<'_>, out: &mut Findings) {
    match ctx.snapshot.platform {
        Platform::Windows => {
            match ctx
                .run_tool("tasklist", &["/FI", "IMAGENAME eq php.exe"])
                .await
            {
                Ok(output) if output.stdout.contains("php.exe") => out.add(
                    "PHP Processes Running",
                    Level::Info,
                    "PHP processes detected (may include queue workers)",
                ),
                Ok(_) => {}
                Err(e) => out.add(
                    "Queue Worker Check Skipped",
                    Level::Info,
                    format!("Could not list processes: {}", e),
                ),
            }
        }
        Platform::Unix => match ctx.run_tool("ps", &["aux"]).await {
            Ok(output) => {
                let workers = queue_worker_lines(&output.stdout);
                if workers.is_empty() {
                    out.add(
                        "No Queue Workers Detected",
                        Level::Info,
                        "No queue:work processes found. Start with: php artisan queue:work",
                    );
                } else {
                    out.add(
                        "Queue Workers Running",
                        Level::Ok,
                        format!("{} queue worker processes detected", workers.len()),
                    );
                }
            }
            Err(e) => out.add(
                "Queue Worker Check Skipped",
                Level::Info,
                format!("Could not list processes: {}", e),
            ),
        },
    }
}
