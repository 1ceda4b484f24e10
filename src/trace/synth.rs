/// Synthetic trace generation with Poisson arrivals.
use crate::error::AppError;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Distribution of job lengths, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthDistribution {
    /// Every job has the same length
    Constant(f64),
    /// Uniform between the bounds
    Uniform { low: f64, high: f64 },
    /// Exponential with the given mean
    Exponential { mean: f64 },
}

impl LengthDistribution {
    fn sample(&self, rng: &mut fastrand::Rng) -> f64 {
        match *self {
            LengthDistribution::Constant(value) => value,
            LengthDistribution::Uniform { low, high } => low + (high - low) * rng.f64(),
            LengthDistribution::Exponential { mean } => exponential(rng, mean),
        }
    }
}

impl FromStr for LengthDistribution {
    type Err = String;

    /// Parses `const:X`, `uniform:LO-HI` or `exp:MEAN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, args) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KIND:ARGS, got '{}'", s))?;

        let number = |v: &str| -> Result<f64, String> {
            let n: f64 = v
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a number", v))?;
            if !n.is_finite() || n < 0.0 {
                return Err(format!("'{}' must be a non-negative number", v));
            }
            Ok(n)
        };

        match kind {
            "const" => Ok(LengthDistribution::Constant(number(args)?)),
            "uniform" => {
                let (low, high) = args
                    .split_once('-')
                    .ok_or_else(|| format!("expected uniform:LO-HI, got '{}'", s))?;
                let (low, high) = (number(low)?, number(high)?);
                if low > high {
                    return Err(format!("uniform bounds reversed: {} > {}", low, high));
                }
                Ok(LengthDistribution::Uniform { low, high })
            }
            "exp" => Ok(LengthDistribution::Exponential {
                mean: number(args)?,
            }),
            other => Err(format!(
                "unknown distribution '{}' (use const, uniform or exp)",
                other
            )),
        }
    }
}

impl fmt::Display for LengthDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthDistribution::Constant(v) => write!(f, "const:{}", v),
            LengthDistribution::Uniform { low, high } => write!(f, "uniform:{}-{}", low, high),
            LengthDistribution::Exponential { mean } => write!(f, "exp:{}", mean),
        }
    }
}

/// Parameters of a synthetic trace.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Mean arrival rate in jobs per second
    pub rate: f64,
    pub count: usize,
    pub lengths: LengthDistribution,
    /// Adds a `Deadline` column at arrival plus this budget
    pub budget_ms: Option<f64>,
    /// Fixed seed for reproducible traces
    pub seed: Option<u64>,
}

/// One generated trace row.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthJob {
    pub admitted_ms: f64,
    pub length_ms: f64,
    pub deadline_ms: Option<f64>,
}

fn exponential(rng: &mut fastrand::Rng, mean: f64) -> f64 {
    // 1 - u lies in (0, 1], so ln never sees zero
    -mean * (1.0 - rng.f64()).ln()
}

/// Generate the rows of a synthetic trace, in arrival order.
pub fn generate(config: &SynthConfig) -> Result<Vec<SynthJob>, AppError> {
    if !config.rate.is_finite() || config.rate <= 0.0 {
        return Err(AppError::Config(format!(
            "Arrival rate must be positive, got {}",
            config.rate
        )));
    }
    if let Some(budget) = config.budget_ms {
        if !budget.is_finite() || budget < 0.0 {
            return Err(AppError::Config(format!(
                "Deadline budget must be non-negative, got {}",
                budget
            )));
        }
    }

    let mut rng = match config.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };
    let mean_gap_ms = 1000.0 / config.rate;

    let mut now_ms = 0.0;
    let mut jobs = Vec::with_capacity(config.count);
    for _ in 0..config.count {
        now_ms += exponential(&mut rng, mean_gap_ms);
        jobs.push(SynthJob {
            admitted_ms: now_ms,
            length_ms: config.lengths.sample(&mut rng),
            deadline_ms: config.budget_ms.map(|b| now_ms + b),
        });
    }
    Ok(jobs)
}

/// Write generated rows as a trace CSV readable by the loader.
pub fn write_trace<W: Write>(jobs: &[SynthJob], with_deadline: bool, writer: W) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if with_deadline {
        wtr.write_record(["Admitted", "Length", "Deadline"])?;
    } else {
        wtr.write_record(["Admitted", "Length"])?;
    }

    for job in jobs {
        let admitted = format!("{:.3}", job.admitted_ms);
        let length = format!("{:.3}", job.length_ms);
        if with_deadline {
            let deadline = job
                .deadline_ms
                .map(|d| format!("{:.3}", d))
                .unwrap_or_default();
            wtr.write_record([admitted, length, deadline])?;
        } else {
            wtr.write_record([admitted, length])?;
        }
    }
    wtr.flush()?;
    Ok(())
}
