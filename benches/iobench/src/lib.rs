use std::fmt::{self, Display};

use eyre::Result;
use tracing::debug;


pub use target::{IoDriver, SpdkOptions, TargetConfig, TargetError, Targets};

/// Options of a single benchmark run, taken verbatim from the caller.
///
/// Sizes and counts stay strings, they are handed to the benchmark as given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunOptions {
    pub output_prefix: String,
    pub latency_results: bool,
    pub poll_results: bool,
    pub submission_results: bool,
    pub buffer_results: bool,
    pub pci_profiling: bool,
    pub num_requests: String,
    pub io_type: String,
    pub queue_depth: String,
    pub io_size: String,
    pub max_file_size: String,
    pub force_sync: bool,
    pub io_bytes: String,
    /// Limit the run by `num_requests` instead of `io_bytes`
    pub limit_requests: bool,
}

const DRIVER_OPTS_FLAG: &str = "--io-driver-opts";

/// Arguments for one benchmark invocation, only the driver options value is
/// quoted when rendered
#[derive(Debug, Clone, PartialEq)]
pub struct Cmdline {
    pub args: Vec<String>,
}

impl Display for Cmdline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = Vec::with_capacity(self.args.len());
        let mut prev: Option<&str> = None;
        for arg in &self.args {
            if prev == Some(DRIVER_OPTS_FLAG) {
                rendered.push(format!("\"{arg}\""));
            } else {
                rendered.push(arg.clone());
            }
            prev = Some(arg);
        }
        let rendered = rendered.join(" ");
        f.write_str(rendered.trim())
    }
}

#[derive(Debug, Default, Clone)]
pub struct IoBench {
    pub targets: Targets,
}

impl IoBench {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }

    pub fn cmdline(&self, target: &str, opts: &RunOptions) -> Result<Cmdline> {
        let config = self.targets.get(target)?;

        let mut args = vec![
            "--output-file-prefix",
            "--io-type",
            "--queue-depth",
            "--io-size",
            "--max-file-size",
        ]
        .into_iter()
        .zip([
            &opts.output_prefix,
            &opts.io_type,
            &opts.queue_depth,
            &opts.io_size,
            &opts.max_file_size,
        ])
        .flat_map(|(arg, value)| [arg.to_owned(), value.clone()])
        .collect::<Vec<_>>();

        for (enabled, arg) in [
            (opts.force_sync, "--force-sync"),
            (opts.latency_results, "--latency-results"),
            (opts.poll_results, "--poll-results"),
            (opts.submission_results, "--submission-results"),
            (opts.buffer_results, "--buffer-results"),
        ] {
            if enabled {
                args.push(arg.to_owned());
            }
        }

        if opts.limit_requests {
            args.extend(["--num-requests".to_owned(), opts.num_requests.clone()]);
        } else {
            args.extend(["--io-bytes".to_owned(), opts.io_bytes.clone()]);
        }

        if let IoDriver::Spdk(spdk) = &config.io_driver {
            let config = if opts.pci_profiling {
                args.extend(["--monitor-device".to_owned(), spdk.device_address.clone()]);
                config.with_bus_profiling()
            } else {
                config.clone()
            };

            args.extend([
                "--io-driver".to_owned(),
                config.io_driver.name().to_owned(),
                "--core-mask".to_owned(),
                config.core_mask.clone(),
            ]);
            if config.async_completions {
                args.push("--async-completions".to_owned());
            }
            if config.complete_batch {
                args.extend(["--complete-batch".to_owned(), opts.queue_depth.clone()]);
            }
            args.extend([
                DRIVER_OPTS_FLAG.to_owned(),
                spdk.args().join(" ").trim().to_owned(),
            ]);
        }

        debug!("target={target} args={}", args.join(" "));
        Ok(Cmdline { args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> RunOptions {
        RunOptions {
            output_prefix: "/tmp/run".to_owned(),
            num_requests: "5000".to_owned(),
            io_type: "randread".to_owned(),
            queue_depth: "32".to_owned(),
            io_size: "4096".to_owned(),
            max_file_size: "10737418240".to_owned(),
            io_bytes: "1048576".to_owned(),
            ..Default::default()
        }
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn spdk_example() {
        let line = IoBench::default()
            .cmdline("spdk", &base_opts())
            .unwrap()
            .to_string();
        assert_eq!(
            line,
            "--output-file-prefix /tmp/run --io-type randread --queue-depth 32 --io-size 4096 \
             --max-file-size 10737418240 --io-bytes 1048576 --io-driver spdk --core-mask 0,10 \
             --async-completions --io-driver-opts \"--transport-type PCIe \
             --device-address 0000.02.00.0 --namespace 1\""
        );
    }

    #[test]
    fn sync_target_skips_driver_options() {
        let opts = RunOptions {
            pci_profiling: true,
            force_sync: true,
            limit_requests: true,
            ..base_opts()
        };
        let line = IoBench::default().cmdline("sync", &opts).unwrap().to_string();
        assert_eq!(
            line,
            "--output-file-prefix /tmp/run --io-type randread --queue-depth 32 --io-size 4096 \
             --max-file-size 10737418240 --force-sync --num-requests 5000"
        );
    }

    #[test]
    fn batch_and_delay() {
        let opts = RunOptions {
            queue_depth: "128".to_owned(),
            ..base_opts()
        };
        let line = IoBench::default()
            .cmdline("spdk_optane_delay_batch", &opts)
            .unwrap()
            .to_string();
        assert!(line.contains(
            "--async-completions --complete-batch 128 --io-driver-opts \"--transport-type PCIe \
             --device-address 0000.17.00.0 --namespace 1 --delay-doorbell\""
        ));
        assert!(line.ends_with('"'));
    }

    #[test]
    fn bus_profiling_prefix_applied_once() {
        let bench = IoBench::default();
        let opts = RunOptions {
            pci_profiling: true,
            ..base_opts()
        };
        for _ in 0..2 {
            let line = bench.cmdline("spdk", &opts).unwrap().to_string();
            assert!(line.contains("--monitor-device 0000.02.00.0 --io-driver spdk"));
            assert!(line.contains("--core-mask 1,0,10 "));
            assert_eq!(count(&line, "1,"), 1);
        }
        assert_eq!(bench.targets.get("spdk").unwrap().core_mask, "0,10");
    }

    #[test]
    fn unknown_target() {
        let err = IoBench::default()
            .cmdline("libaio", &base_opts())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TargetError>(),
            Some(&TargetError::UnknownTarget("libaio".to_owned()))
        );
    }

    #[test]
    fn base_values_render_literally() {
        let opts = RunOptions {
            output_prefix: "/tmp/my run".to_owned(),
            ..base_opts()
        };
        let line = IoBench::default().cmdline("sync", &opts).unwrap().to_string();
        assert!(line.starts_with("--output-file-prefix /tmp/my run --io-type randread "));
        assert!(!line.contains('"'));
    }

    #[test]
    fn argv_keeps_driver_options_unquoted() {
        let cmd = IoBench::default().cmdline("spdk", &base_opts()).unwrap();
        assert_eq!(
            cmd.args.last().unwrap(),
            "--transport-type PCIe --device-address 0000.02.00.0 --namespace 1"
        );
    }

    #[test]
    fn flags_follow_options_for_every_target() {
        let bench = IoBench::default();
        let optional = [
            "--force-sync",
            "--latency-results",
            "--poll-results",
            "--submission-results",
            "--buffer-results",
        ];

        for (name, config) in bench.targets.iter() {
            for bits in 0u32..(1 << 7) {
                let bit = |i: u32| bits & (1 << i) != 0;
                let opts = RunOptions {
                    force_sync: bit(0),
                    latency_results: bit(1),
                    poll_results: bit(2),
                    submission_results: bit(3),
                    buffer_results: bit(4),
                    pci_profiling: bit(5),
                    limit_requests: bit(6),
                    ..base_opts()
                };
                let cmd = bench.cmdline(name, &opts).unwrap();
                let line = cmd.to_string();

                assert_eq!(line.trim(), line);
                for base in [
                    "--output-file-prefix /tmp/run ",
                    "--io-type randread ",
                    "--queue-depth 32 ",
                    "--io-size 4096 ",
                    "--max-file-size 10737418240 ",
                ] {
                    assert!(line.contains(base), "{name}: missing {base} in {line}");
                }

                for (i, arg) in optional.iter().enumerate() {
                    let expected = usize::from(bit(i as u32));
                    assert_eq!(
                        cmd.args.iter().filter(|x| x == arg).count(),
                        expected,
                        "{name}: {arg} in {line}"
                    );
                }

                let by_requests = cmd.args.iter().any(|x| x == "--num-requests");
                let by_bytes = cmd.args.iter().any(|x| x == "--io-bytes");
                assert_eq!(by_requests, opts.limit_requests);
                assert_ne!(by_requests, by_bytes);

                match &config.io_driver {
                    IoDriver::Spdk(spdk) => {
                        assert_eq!(count(&line, "--io-driver-opts \""), 1);
                        assert!(line.ends_with(&format!(
                            "--io-driver-opts \"{}\"",
                            spdk.args().join(" ")
                        )));
                        let mask = if opts.pci_profiling { "1,0,10" } else { "0,10" };
                        assert!(line.contains(&format!("--core-mask {mask} ")));
                    }
                    IoDriver::Sync => {
                        assert!(!line.contains("--io-driver"));
                        assert!(!line.contains("--monitor-device"));
                    }
                }
            }
        }
    }
}
