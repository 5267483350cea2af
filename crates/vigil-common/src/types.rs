use crate::error::MetricError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metric kind. Gauges are last-write-wins floats, counters are signed
/// 64-bit deltas that accumulate into a running total.
///
/// # Examples
///
/// ```
/// use vigil_common::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("summary".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnknownMetricKind(s.to_string())),
        }
    }
}

/// Parses a gauge. NaN and infinities are refused: neither JSON nor the
/// relational backend can hold them.
pub fn parse_gauge(raw: &str) -> Result<f64, MetricError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MetricError::BadMetricValue {
            kind: "gauge",
            value: raw.to_string(),
        })
}

pub fn parse_counter(raw: &str) -> Result<i64, MetricError> {
    raw.parse::<i64>().map_err(|_| MetricError::BadMetricValue {
        kind: "counter",
        value: raw.to_string(),
    })
}

/// Shortest representation that parses back to the same float
/// (`100.0` renders as `100`, never in exponent form).
pub fn format_gauge(value: f64) -> String {
    value.to_string()
}

pub fn format_counter(value: i64) -> String {
    value.to_string()
}

/// One named reading as produced by a sampler. The value stays in its raw
/// textual form until the batch is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub raw_value: String,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, kind: MetricKind, raw_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            raw_value: raw_value.into(),
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge, format_gauge(value))
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self::new(name, MetricKind::Counter, format_counter(delta))
    }
}

/// Which sampler produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Process and runtime counters.
    Primary,
    /// Host resource counters.
    Secondary,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Primary => write!(f, "primary"),
            SnapshotKind::Secondary => write!(f, "secondary"),
        }
    }
}

/// The samples taken by one sampler tick. A snapshot with `error` set
/// carries no usable samples.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub samples: HashMap<String, MetricSample>,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn new(kind: SnapshotKind, samples: impl IntoIterator<Item = MetricSample>) -> Self {
        Self {
            kind,
            samples: samples
                .into_iter()
                .map(|sample| (sample.name.clone(), sample))
                .collect(),
            error: None,
        }
    }

    pub fn failed(kind: SnapshotKind, error: impl std::fmt::Display) -> Self {
        Self {
            kind,
            samples: HashMap::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Wire representation of one metric in a batch update.
///
/// Exactly one of `value` (gauges) or `delta` (counters) is populated.
///
/// # Examples
///
/// ```
/// use vigil_common::{MetricSample, WireMetric};
///
/// let wire = WireMetric::try_from(&MetricSample::counter("PollCount", 5)).unwrap();
/// assert_eq!(
///     serde_json::to_string(&wire).unwrap(),
///     r#"{"id":"PollCount","type":"counter","delta":5}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMetric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl WireMetric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            value: None,
            delta: Some(delta),
        }
    }

    /// Raw textual value for the populated field of this metric's kind.
    pub fn raw_value(&self) -> Result<String, MetricError> {
        match self.kind {
            MetricKind::Gauge => self.value.map(format_gauge).ok_or(MetricError::BadMetricValue {
                kind: "gauge",
                value: String::new(),
            }),
            MetricKind::Counter => {
                self.delta
                    .map(format_counter)
                    .ok_or(MetricError::BadMetricValue {
                        kind: "counter",
                        value: String::new(),
                    })
            }
        }
    }
}

impl TryFrom<&MetricSample> for WireMetric {
    type Error = MetricError;

    fn try_from(sample: &MetricSample) -> Result<Self, Self::Error> {
        match sample.kind {
            MetricKind::Gauge => Ok(WireMetric::gauge(
                sample.name.clone(),
                parse_gauge(&sample.raw_value)?,
            )),
            MetricKind::Counter => Ok(WireMetric::counter(
                sample.name.clone(),
                parse_counter(&sample.raw_value)?,
            )),
        }
    }
}

/// Gauge and counter values keyed by metric name.
///
/// Serialized as `{"gauges": {...}, "counters": {...}}`, which is also the
/// snapshot-file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTable {
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Builds a table from wire metrics. Counter entries for the same id are
    /// summed, gauges keep the last value seen.
    pub fn from_wire(metrics: &[WireMetric]) -> Result<Self, MetricError> {
        let mut table = Self::new();
        for metric in metrics {
            match metric.kind {
                MetricKind::Gauge => {
                    let value = metric.value.ok_or(MetricError::BadMetricValue {
                        kind: "gauge",
                        value: String::new(),
                    })?;
                    if !value.is_finite() {
                        return Err(MetricError::BadMetricValue {
                            kind: "gauge",
                            value: format_gauge(value),
                        });
                    }
                    table.gauges.insert(metric.id.clone(), value);
                }
                MetricKind::Counter => {
                    let delta = metric.delta.ok_or(MetricError::BadMetricValue {
                        kind: "counter",
                        value: String::new(),
                    })?;
                    let total = table.counters.entry(metric.id.clone()).or_insert(0);
                    *total = total.wrapping_add(delta);
                }
            }
        }
        Ok(table)
    }
}
