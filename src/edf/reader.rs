//! EDF reader with lazily evaluated parse phases.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cpap_sd::edf::EdfReader;
//! use cpap_sd::types::Decoded;
//!
//! fn read_flow() -> cpap_sd::Result<()> {
//!     let mut reader = EdfReader::open("DATALOG/20240101/20240101_230000_BRP.edf")?;
//!     println!("Recording started {}", reader.parse_header()?.start);
//!
//!     if let Some(index) = reader.signal_index("Flow.40ms")? {
//!         if let Decoded::Physical(values) = reader.get_physical_values(index)? {
//!             println!("{} flow samples", values.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Phases
//!
//! [`EdfReader::parse_header`], [`EdfReader::parse_signal_headers`] and
//! [`EdfReader::parse_data`] may be called in any order; each runs its
//! predecessors first. Each phase either completes or leaves no trace, and
//! completed phases are not repeated.
//!
//! ## Performance Notes
//!
//! - The file is read into memory once and the handle closed before parsing
//! - Digital samples are stored as one contiguous buffer per signal
//! - Physical values are computed on first request and cached per signal

use super::annotations::{self, Annotation};
use super::dialect::{Dialect, PhysicalRange, StandardDialect, UnitResolution};
use super::format::{self, HEADER_SIZE, Header, RawSignalHeader};
use crate::bytes::{ByteReader, is_gzip};
use crate::channels::{self, ChannelId, ChannelRole};
use crate::checksum::{ChecksumVerifier, CrcMode, CrcStatus};
use crate::types::{Decoded, Decoding, NonDecodable, ParseWarning, SignalDescriptor, convert};
use crate::{CpapError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Digital samples plus lazily decoded physical values.
#[derive(Debug, Default)]
struct SampleStore {
    digital: Vec<Vec<i16>>,
    physical: Vec<Option<Vec<f64>>>,
}

impl SampleStore {
    fn decode(&mut self, signal: &SignalDescriptor) -> Decoded<'_> {
        let digital = &self.digital[signal.index];
        if !signal.is_decodable() {
            return Decoded::Raw(digital);
        }

        let values = self.physical[signal.index].get_or_insert_with(|| {
            trace!(signal = signal.index, samples = digital.len(), "Decoding physical values");
            digital
                .iter()
                .map(|&value| {
                    convert(
                        value,
                        signal.digital_min,
                        signal.digital_max,
                        signal.physical_min,
                        signal.physical_max,
                    )
                })
                .collect()
        });
        Decoded::Physical(values.as_slice())
    }
}

/// Reader for one EDF file, generic over the header [`Dialect`].
#[derive(Debug)]
pub struct EdfReader<D: Dialect = StandardDialect> {
    data: ByteReader,
    path: PathBuf,
    dialect: D,
    crc_status: CrcStatus,
    header: Option<Header>,
    signals: Option<Vec<SignalDescriptor>>,
    samples: Option<SampleStore>,
    warnings: Vec<ParseWarning>,
}

impl EdfReader<StandardDialect> {
    /// Open a file with the standard dialect, without checksum verification.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StandardDialect, &ChecksumVerifier::new(CrcMode::Disabled))
    }

    /// Create a reader from bytes (for testing).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, PathBuf::from("<memory>"), StandardDialect)
    }
}

impl<D: Dialect> EdfReader<D> {
    /// Open a file, verifying its checksum sibling over the bytes as stored.
    ///
    /// The file is read fully and closed before parsing starts.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        dialect: D,
        verifier: &ChecksumVerifier,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|e| CpapError::file_error(path.to_path_buf(), e))?;
        let crc_status = verifier.verify_bytes(path, &raw)?;

        let mut reader = Self::from_bytes_with(raw, path.to_path_buf(), dialect)?;
        reader.crc_status = crc_status;
        Ok(reader)
    }

    /// Create a reader from bytes with path context.
    pub fn from_bytes_with(data: Vec<u8>, path: PathBuf, dialect: D) -> Result<Self> {
        let data = ByteReader::new(data)?;
        debug!(
            path = %path.display(),
            bytes = data.len(),
            gzip = data.is_decompressed(),
            dialect = dialect.name(),
            "Loaded EDF buffer"
        );
        Ok(Self {
            data,
            path,
            dialect,
            crc_status: CrcStatus::Skipped,
            header: None,
            signals: None,
            samples: None,
            warnings: Vec::new(),
        })
    }

    /// Parse (once) and return the main header.
    pub fn parse_header(&mut self) -> Result<&Header> {
        let header = match self.header.take() {
            Some(header) => header,
            None => {
                self.data.seek(0)?;
                let header = Header::parse(&mut self.data)?;
                header.validate()?;
                header
            }
        };
        Ok(self.header.insert(header))
    }

    /// Parse (once) and return the signal descriptors.
    pub fn parse_signal_headers(&mut self) -> Result<&[SignalDescriptor]> {
        let signals = match self.signals.take() {
            Some(signals) => signals,
            None => self.read_signal_headers()?,
        };
        Ok(self.signals.insert(signals))
    }

    /// Parse (once) every data record into per-signal digital buffers.
    pub fn parse_data(&mut self) -> Result<&[Vec<i16>]> {
        Ok(&self.sample_store()?.digital)
    }

    fn read_signal_headers(&mut self) -> Result<Vec<SignalDescriptor>> {
        let mut header = self.parse_header()?.clone();
        let mut warnings = Vec::new();

        self.data.seek(HEADER_SIZE)?;
        let raw = format::read_signal_headers(&mut self.data, header.signal_count)?;

        let signals = raw
            .iter()
            .enumerate()
            .map(|(index, raw)| self.describe_signal(index, raw, &mut warnings))
            .collect::<Result<Vec<_>>>()?;

        let expected = header.expected_header_bytes();
        if header.header_bytes != expected {
            warnings.push(ParseWarning::HeaderSizeMismatch {
                declared: header.header_bytes,
                expected,
            });
        }

        let record_bytes: usize = signals.iter().map(|s| s.samples_per_record * 2).sum();
        let available = self.data.len().saturating_sub(expected);
        let record_count = match header.record_count {
            Some(count) => count,
            None => {
                let derived = if record_bytes == 0 { 0 } else { available / record_bytes };
                warnings.push(ParseWarning::DerivedRecordCount { records: derived });
                derived
            }
        };
        let trailing = available.saturating_sub(record_count.saturating_mul(record_bytes));
        if trailing > 0 {
            warnings.push(ParseWarning::TrailingBytes { bytes: trailing });
        }

        for warning in &warnings {
            warn!(path = %self.path.display(), %warning, "Tolerated header deviation");
        }

        header.record_count = Some(record_count);
        self.header = Some(header);
        self.warnings.extend(warnings);

        debug!(
            path = %self.path.display(),
            signals = signals.len(),
            records = record_count,
            "Parsed signal headers"
        );
        Ok(signals)
    }

    fn describe_signal(
        &self,
        index: usize,
        raw: &RawSignalHeader,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<SignalDescriptor> {
        let label = raw.label.trim().to_string();
        let channel = match channels::lookup(&label) {
            Ok(spec) => Some(spec),
            Err(CpapError::UnknownChannel { .. }) => {
                debug!(signal = index, label = %label, "Passing through uncatalogued signal");
                warnings.push(ParseWarning::UnknownChannel { signal: index, label: label.clone() });
                None
            }
            Err(other) => return Err(other),
        };

        let digital_min: i32 = format::parse_number("digital min", &raw.digital_min)?;
        let digital_max: i32 = format::parse_number("digital max", &raw.digital_max)?;
        let samples_per_record: usize =
            format::parse_number("samples per record", &raw.samples_per_record)?;

        let unit = match self.dialect.resolve_unit(raw, channel) {
            UnitResolution::Declared(unit) => unit,
            UnitResolution::Fallback(unit) => {
                warnings.push(ParseWarning::UnitFallback {
                    signal: index,
                    label: label.clone(),
                    dimension: raw.dimension.clone(),
                    unit: unit.clone(),
                });
                unit
            }
        };

        let is_annotation = channel.is_some_and(|spec| spec.role == ChannelRole::Annotation);
        let (physical_min, physical_max, decoding) = if is_annotation {
            (0.0, 0.0, Decoding::NonDecodable(NonDecodable::Annotation))
        } else {
            let range = self.dialect.physical_range(raw, (digital_min, digital_max))?;
            if let PhysicalRange::DigitalFallback { .. } = range {
                warnings.push(ParseWarning::MalformedPhysicalRange {
                    signal: index,
                    label: label.clone(),
                    physical_min: raw.physical_min.clone(),
                    physical_max: raw.physical_max.clone(),
                });
            }
            let (min, max) = range.bounds();
            let decoding = SignalDescriptor::decoding_for(digital_min, digital_max, min, max);
            if let Decoding::NonDecodable(reason) = decoding {
                warnings.push(ParseWarning::NonDecodable {
                    signal: index,
                    label: label.clone(),
                    reason,
                });
            }
            (min, max, decoding)
        };

        Ok(SignalDescriptor {
            index,
            label,
            transducer: raw.transducer.clone(),
            dimension: raw.dimension.clone(),
            unit,
            physical_min,
            physical_max,
            digital_min,
            digital_max,
            prefilter: raw.prefilter.clone(),
            samples_per_record,
            channel,
            decoding,
        })
    }

    fn sample_store(&mut self) -> Result<&mut SampleStore> {
        let store = match self.samples.take() {
            Some(store) => store,
            None => self.read_samples()?,
        };
        Ok(self.samples.insert(store))
    }

    fn read_samples(&mut self) -> Result<SampleStore> {
        let counts: Vec<usize> =
            self.parse_signal_headers()?.iter().map(|s| s.samples_per_record).collect();
        let header = self.parse_header()?;
        let record_count = header.record_count.unwrap_or(0);
        let data_offset = header.expected_header_bytes();

        let record_bytes: usize = counts.iter().map(|count| count * 2).sum();
        let needed = record_bytes.checked_mul(record_count).ok_or(CpapError::OutOfBounds {
            offset: data_offset,
            requested: usize::MAX,
            len: self.data.len(),
        })?;
        if data_offset.saturating_add(needed) > self.data.len() {
            return Err(CpapError::OutOfBounds {
                offset: data_offset,
                requested: needed,
                len: self.data.len(),
            });
        }

        let mut digital: Vec<Vec<i16>> =
            counts.iter().map(|count| Vec::with_capacity(count * record_count)).collect();

        self.data.seek(data_offset)?;
        for _ in 0..record_count {
            for (buffer, &count) in digital.iter_mut().zip(&counts) {
                let bytes = self.data.read_bytes(count * 2)?;
                buffer.extend(
                    bytes.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
                );
            }
        }

        debug!(
            path = %self.path.display(),
            records = record_count,
            signals = counts.len(),
            "Parsed data records"
        );
        let physical = vec![None; digital.len()];
        Ok(SampleStore { digital, physical })
    }

    /// Descriptor of signal `index`.
    pub fn signal(&mut self, index: usize) -> Result<&SignalDescriptor> {
        let signals = self.parse_signal_headers()?;
        let count = signals.len();
        signals.get(index).ok_or(CpapError::SignalIndex { index, count })
    }

    /// Index of the first signal whose label matches, ignoring case and padding.
    pub fn signal_index(&mut self, label: &str) -> Result<Option<usize>> {
        let label = label.trim();
        Ok(self
            .parse_signal_headers()?
            .iter()
            .position(|signal| signal.label.eq_ignore_ascii_case(label)))
    }

    /// Index of the first signal resolved to a catalog channel.
    pub fn find_channel(&mut self, id: ChannelId) -> Result<Option<usize>> {
        Ok(self.parse_signal_headers()?.iter().position(|signal| signal.channel_id() == Some(id)))
    }

    /// Digital samples of one signal, across all records.
    pub fn digital_samples(&mut self, index: usize) -> Result<&[i16]> {
        self.signal(index)?;
        Ok(&self.sample_store()?.digital[index])
    }

    /// Physical values of one signal, decoded on first call and cached.
    ///
    /// Non-decodable signals yield their digital samples as [`Decoded::Raw`].
    pub fn get_physical_values(&mut self, index: usize) -> Result<Decoded<'_>> {
        let signal = self.signal(index)?.clone();
        Ok(self.sample_store()?.decode(&signal))
    }

    /// Physical values scaled to the catalog's canonical unit.
    ///
    /// `None` for non-decodable signals.
    pub fn canonical_values(&mut self, index: usize) -> Result<Option<Vec<f64>>> {
        let scale = self.signal(index)?.canonical_scale();
        Ok(self
            .get_physical_values(index)?
            .as_physical()
            .map(|values| values.iter().map(|value| value * scale).collect()))
    }

    /// Samples per second of one signal.
    pub fn sample_rate(&mut self, index: usize) -> Result<f64> {
        let samples = self.signal(index)?.samples_per_record as f64;
        let duration = self.parse_header()?.record_duration;
        Ok(if duration > 0.0 { samples / duration } else { 0.0 })
    }

    /// Number of data records, derived from the file size if the header left it open.
    pub fn record_count(&mut self) -> Result<usize> {
        self.parse_signal_headers()?;
        Ok(self.parse_header()?.record_count.unwrap_or(0))
    }

    /// Annotations from every `EDF Annotations` signal, in record order.
    pub fn annotations(&mut self) -> Result<Vec<Annotation>> {
        let targets: Vec<(usize, usize)> = self
            .parse_signal_headers()?
            .iter()
            .filter(|signal| signal.decoding == Decoding::NonDecodable(NonDecodable::Annotation))
            .map(|signal| (signal.index, signal.samples_per_record))
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.sample_store()?;
        let mut found = Vec::new();
        for (index, per_record) in targets {
            if per_record == 0 {
                continue;
            }
            for record in store.digital[index].chunks(per_record) {
                found.extend(annotations::parse_tals(&annotations::samples_to_bytes(record)));
            }
        }
        trace!(count = found.len(), "Extracted annotations");
        Ok(found)
    }

    /// Header if already parsed.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Deviations tolerated so far.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn crc_status(&self) -> CrcStatus {
        self.crc_status
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Whether the file was stored gzip-compressed.
    pub fn was_compressed(&self) -> bool {
        self.data.is_decompressed()
    }
}

/// Read only the 256-byte main header of a file, inflating gzip on the fly.
pub fn peek_header<P: AsRef<Path>>(path: P) -> Result<Header> {
    let path = path.as_ref();
    let file_error = |e| CpapError::file_error(path.to_path_buf(), e);

    let mut file = BufReader::new(File::open(path).map_err(file_error)?);
    let compressed = is_gzip(file.fill_buf().map_err(file_error)?);

    let mut buffer = Vec::with_capacity(HEADER_SIZE);
    if compressed {
        MultiGzDecoder::new(file)
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut buffer)
            .map_err(|source| CpapError::Decompress { source })?;
    } else {
        file.take(HEADER_SIZE as u64).read_to_end(&mut buffer).map_err(file_error)?;
    }

    let mut reader = ByteReader::new(buffer)?;
    let header = Header::parse(&mut reader)?;
    header.validate()?;
    trace!(path = %path.display(), start = %header.start, "Peeked header");
    Ok(header)
}
