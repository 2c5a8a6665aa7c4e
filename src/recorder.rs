use crate::decode::{AnalogSample, SampleSink};
use crate::profile::DeviceProfile;
use polars::prelude::*;
use std::time::Instant;

pub const TIME_COLUMN_NAME: &str = "time";

/// Sink that keeps every frame as one row, one `f32` column per channel plus
/// a `time` column in seconds since the first frame.
#[derive(Debug)]
pub struct DataFrameRecorder {
    names: Vec<&'static str>,
    columns: Vec<Vec<f32>>,
    times: Vec<f64>,
    first_frame: Option<Instant>,
    finished: bool,
}

impl DataFrameRecorder {
    pub fn new(profile: &DeviceProfile) -> Self {
        let names: Vec<_> = profile.channels().map(|c| c.name).collect();
        let columns = vec![Vec::new(); names.len()];
        Self {
            names,
            columns,
            times: Vec::new(),
            first_frame: None,
            finished: false,
        }
    }

    /// Number of frames recorded.
    pub fn height(&self) -> usize {
        self.times.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.names.len() + 1);
        columns.push(Series::new(TIME_COLUMN_NAME.into(), self.times.clone()).into());
        for (name, values) in self.names.iter().zip(&self.columns) {
            // Columns of an interrupted frame are cut to the last full row.
            let values = &values[..self.height().min(values.len())];
            columns.push(Series::new((*name).into(), values.to_vec()).into());
        }
        DataFrame::new(columns)
    }
}

impl SampleSink for DataFrameRecorder {
    fn send(&mut self, sample: &AnalogSample) {
        if let Some(column) = self.columns.get_mut(sample.channel_index) {
            column.push(sample.value);
        }
    }

    fn frame_done(&mut self) {
        let now = Instant::now();
        let first = *self.first_frame.get_or_insert(now);
        self.times.push(now.duration_since(first).as_secs_f64());
    }

    fn end_acquisition(&mut self) {
        log::debug!("Recorded {} frames", self.height());
        self.finished = true;
    }
}
