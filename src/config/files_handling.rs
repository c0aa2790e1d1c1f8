// imports
use crate::classifier::{Learner, NominalFilter, TrainedModel};
use crate::error::{Result, WsdError};
use crate::evaluation::EvaluationSummary;
use crate::example_set::{ExampleSet, Schema};
use crate::features::{FeatureVector, Slot, ATTRIBUTE_NAMES, NUM_ATTRIBUTES};

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array2;
use ndarray_npy::write_npy;


pub const MERGED_STEM: &str = "examples";
const WEIGHT_COLUMN: &str = "weight";
const CLASSIFIER_SUFFIX: &str = ".classifier";
const FILTER_SUFFIX: &str = ".filter";
const HEADER_SUFFIX: &str = ".instanceheader";
const PACKAGE_SUFFIX: &str = ".tar.gz";


pub fn batch_file_name(index: usize, compress: bool) -> String {
    format!("{}.csv{}", index, if compress { ".gz" } else { "" })
}

pub fn merged_file_name(compress: bool) -> String {
    format!("{}.csv{}", MERGED_STEM, if compress { ".gz" } else { "" })
}

pub fn model_file_name(name: &str, compress: bool) -> String {
    format!("{}{}", name, if compress { PACKAGE_SUFFIX } else { "" })
}


pub fn read_input<R: ReadFile>(file_path: &str) -> Result<R> {
    R::read_file(file_path)
}

/// Saves `item` under `output_dir`, creating the folder if needed. Returns the written path.
pub fn save_output<S: SaveFile>(output_dir: &str, file_name: &str, item: &S) -> Result<PathBuf> {

    // create output folder
    fs::create_dir_all(output_dir)?;
    item.save_file(output_dir, file_name)
}

pub trait ReadFile: Sized {
    fn read_file(file_path: &str) -> Result<Self>;
}

pub trait SaveFile {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<PathBuf>;
}


// example sets are csv, the 19 attributes then the weight, absent slots are empty fields
fn write_examples<W: Write>(set: &ExampleSet, writer: W) -> Result<()> {

    let mut wrt = csv::WriterBuilder::new().from_writer(writer);
    let mut header: Vec<&str> = ATTRIBUTE_NAMES.to_vec();
    header.push(WEIGHT_COLUMN);
    wrt.write_record(&header)?;

    for example in set.iter() {
        let mut record: Vec<String> = example.vector.slots().iter().map(|s| s.clone().unwrap_or_default()).collect();
        record.push(example.weight.to_string());
        wrt.write_record(&record)?;
    }
    wrt.flush()?;
    Ok(())
}

fn read_examples<R: Read>(reader: R, set: &mut ExampleSet) -> Result<()> {

    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let header: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    set.schema().check_header(&header)?;
    if header.len() != NUM_ATTRIBUTES + 1 || header[NUM_ATTRIBUTES] != WEIGHT_COLUMN {
        return Err(WsdError::Schema(format!("expected a trailing {} column", WEIGHT_COLUMN)));
    }

    for (line, record) in rdr.records().enumerate() {

        let record = record?;
        let mut slots: [Slot; NUM_ATTRIBUTES] = Default::default();
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = record.get(i).filter(|v| !v.is_empty()).map(|v| v.to_string());
        }
        let weight: f64 = record
        .get(NUM_ATTRIBUTES)
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| WsdError::Schema(format!("row {} has no valid weight", line + 1)))?;

        if !set.add_weighted(FeatureVector::from_slots(slots), weight) {
            return Err(WsdError::Schema(format!("row {} does not match the schema", line + 1)));
        }
    }
    Ok(())
}

fn read_example_file(path: &Path, set: &mut ExampleSet) -> Result<()> {
    let f = BufReader::new(File::open(path)?);
    if path.extension().map_or(false, |e| e == "gz") {
        read_examples(GzDecoder::new(f), set)
    } else {
        read_examples(f, set)
    }
}

/// Batch files `<index>.csv[.gz]` of a directory, in index order.
pub fn batch_files(dir: &str) -> Result<Vec<(usize, PathBuf)>> {

    let mut files: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let stem = name.strip_suffix(".csv.gz").or_else(|| name.strip_suffix(".csv"));
        if let Some(index) = stem.and_then(|s| s.parse::<usize>().ok()) {
            files.push((index, path));
        }
    }
    files.sort();
    Ok(files)
}

impl ReadFile for ExampleSet {
    // a file is read as is, a directory is the merge of its batch files
    fn read_file(file_path: &str) -> Result<Self> {
        let mut set = ExampleSet::new();
        if Path::new(file_path).is_dir() {
            for (_, path) in batch_files(file_path)? {
                read_example_file(&path, &mut set)?;
            }
        } else {
            read_example_file(Path::new(file_path), &mut set)?;
        }
        Ok(set)
    }
}

impl SaveFile for ExampleSet {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<PathBuf> {
        let out = Path::new(output_dir).join(file_name);
        let f = BufWriter::new(File::create(&out)?);
        if file_name.ends_with(".gz") {
            let mut writer = GzEncoder::new(f, Compression::default());
            write_examples(self, &mut writer)?;
            writer.finish()?.flush()?;
        } else {
            write_examples(self, f)?;
        }
        Ok(out)
    }
}


fn model_parts(model: &TrainedModel) -> Result<Vec<(String, Vec<u8>)>> {
    let name = model.name();
    Ok(vec![
        (name.clone() + CLASSIFIER_SUFFIX, bincode::serialize(&model.learner)?),
        (name.clone() + FILTER_SUFFIX, bincode::serialize(model.learner.filter())?),
        (name + HEADER_SUFFIX, serde_json::to_vec(&model.header)?),
    ])
}

fn model_from_parts(parts: Vec<(String, Vec<u8>)>) -> Result<TrainedModel> {

    let mut learner: Option<Learner> = None;
    let mut filter: Option<NominalFilter> = None;
    let mut header: Option<Schema> = None;
    for (name, buf) in parts {
        if name.ends_with(CLASSIFIER_SUFFIX) {
            learner = Some(bincode::deserialize(&buf)?);
        } else if name.ends_with(FILTER_SUFFIX) {
            filter = Some(bincode::deserialize(&buf)?);
        } else if name.ends_with(HEADER_SUFFIX) {
            header = Some(serde_json::from_slice(&buf)?);
        }
    }

    let (learner, filter, header) = match (learner, filter, header) {
        (Some(l), Some(f), Some(h)) => (l, f, h),
        _ => return Err(WsdError::Schema("model package is missing a part".to_string())),
    };
    if learner.filter() != &filter {
        return Err(WsdError::Schema("model filter does not belong to its classifier".to_string()));
    }
    if header != Schema::default() {
        return Err(WsdError::Schema(format!("unexpected model header {:?}", header.attributes)));
    }
    Ok(TrainedModel { header: header, learner: learner })
}

impl SaveFile for TrainedModel {
    // `<name>.tar.gz` packs the three parts, any other name writes them loose as `<name>.<part>`
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<PathBuf> {

        let parts = model_parts(self)?;
        let out = Path::new(output_dir).join(file_name);

        if file_name.ends_with(PACKAGE_SUFFIX) {
            let f = BufWriter::new(File::create(&out)?);
            let mut builder = tar::Builder::new(GzEncoder::new(f, Compression::default()));
            for (name, buf) in &parts {
                let mut header = tar::Header::new_gnu();
                header.set_size(buf.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, buf.as_slice())?;
            }
            builder.into_inner()?.finish()?.flush()?;
        } else {
            let stem = file_name.to_string();
            for (name, buf) in &parts {
                let suffix = &name[self.name().len()..];
                let mut f = BufWriter::new(File::create(Path::new(output_dir).join(stem.clone() + suffix))?);
                f.write_all(buf)?;
                f.flush()?;
            }
        }
        Ok(out)
    }
}

impl ReadFile for TrainedModel {
    fn read_file(file_path: &str) -> Result<Self> {

        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
        if file_path.ends_with(PACKAGE_SUFFIX) {
            let f = BufReader::new(File::open(file_path)?);
            let mut archive = tar::Archive::new(GzDecoder::new(f));
            for entry in archive.entries()? {
                let mut entry = entry?;
                let name = entry.path()?.to_string_lossy().into_owned();
                let mut buf: Vec<u8> = Vec::new();
                entry.read_to_end(&mut buf)?;
                parts.push((name, buf));
            }
        } else {
            for suffix in [CLASSIFIER_SUFFIX, FILTER_SUFFIX, HEADER_SUFFIX] {
                let name = file_path.to_string() + suffix;
                parts.push((name.clone(), fs::read(name)?));
            }
        }
        model_from_parts(parts)
    }
}


impl SaveFile for EvaluationSummary {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<PathBuf> {
        let out = Path::new(output_dir).join(file_name);
        let mut f = BufWriter::new(File::create(&out)?);
        serde_json::to_writer_pretty(&mut f, self)?;
        f.flush()?;
        Ok(out)
    }
}

impl ReadFile for EvaluationSummary {
    fn read_file(file_path: &str) -> Result<Self> {
        let f = BufReader::new(File::open(file_path)?);
        Ok(serde_json::from_reader(f)?)
    }
}

impl SaveFile for Array2<f64> {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<PathBuf> {
        let out = Path::new(output_dir).join(file_name);
        write_npy(&out, self)?;
        Ok(out)
    }
}
