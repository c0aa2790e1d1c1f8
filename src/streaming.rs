// imports
use crate::config::{files_handling, RunParams};
use crate::error::{Result, WsdError};
use crate::example_set::ExampleSet;
use crate::synthesizer::ExampleSynthesizer;
use crate::trainer::{Trainer, TrainingMode};

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use flate2::read::GzDecoder;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, error, info, warn};


// lines handed to the pool at once when no batch size is configured
const DISPATCH_LINES: usize = 10000;


#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub lines_read: usize,
    pub lines_skipped: usize,
    pub lines_failed: usize,
    pub examples: usize,
    pub batches_written: usize,
}


#[derive(Clone, Debug, PartialEq)]
pub struct StreamSettings {
    pub num_threads: usize,
    pub batch_lines: Option<usize>,
    pub batch_dir: Option<String>,
    pub compress: bool,
    pub skip_lines: usize,
    pub drain_timeout: Duration,
}

impl StreamSettings {
    pub fn from_params(params: &RunParams) -> StreamSettings {
        Self {
            num_threads: params.num_threads,
            batch_lines: params.batch_lines,
            batch_dir: params.batch_dir.clone(),
            compress: params.compress,
            skip_lines: params.skip_lines,
            drain_timeout: Duration::from_secs(params.drain_timeout_mins * 60),
        }
    }
}


/// Every regular file under `path` in sorted order, or `path` itself when it is a file.
pub fn corpus_files(path: &Path) -> Result<Vec<PathBuf>> {

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(path)?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            files.extend(corpus_files(&entry)?);
        } else if entry.is_file() {
            files.push(entry);
        }
    }
    Ok(files)
}

fn read_file(file_path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(file_path)?;
    if file_path.extension().map_or(false, |e| e == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}


// what a line task sends back: its line number and how many examples it produced
type LineOutcome = (usize, Result<usize>);


/// Streams a corpus through the synthesizer on an owned worker pool. Lines are dispatched
/// in batches, each batch is drained before its examples are persisted and the set is reset.
pub struct StreamingOrchestrator {
    synthesizer: Arc<ExampleSynthesizer>,
    trainer: Arc<Trainer>,
    settings: StreamSettings,
    pool: ThreadPool,
}

impl StreamingOrchestrator {

    pub fn new(synthesizer: Arc<ExampleSynthesizer>, trainer: Arc<Trainer>, settings: StreamSettings) -> Result<StreamingOrchestrator> {
        let pool = ThreadPoolBuilder::new()
        .num_threads(settings.num_threads)
        .thread_name(|i| format!("wsd-worker-{}", i))
        .panic_handler(|_| error!("line task panicked"))
        .build()?;
        Ok(Self { synthesizer: synthesizer, trainer: trainer, settings: settings, pool: pool })
    }

    // batch indices are 1 based and continue after the batches a skipped prefix already wrote
    fn first_batch_index(&self) -> usize {
        match self.settings.batch_lines {
            Some(batch_lines) => self.settings.skip_lines / batch_lines + 1,
            None => 1,
        }
    }

    pub fn run(&self, corpus: &Path) -> Result<StreamReport> {

        let timer = Instant::now();
        let files = corpus_files(corpus)?;
        info!(files = files.len(), mode = %self.trainer.mode(), "streaming corpus");

        let dispatch_size = self.settings.batch_lines.unwrap_or(DISPATCH_LINES);
        let mut report = StreamReport::default();
        let mut batch_index = self.first_batch_index();
        let mut pending: Vec<(usize, String)> = Vec::with_capacity(dispatch_size);
        let mut line_no = 0usize;

        for file_path in &files {

            let mut reader = match read_file(file_path) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(file = %file_path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };

            let mut buf = Vec::new();
            loop {

                buf.clear();
                // a broken stream loses the rest of its file, not the run
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {},
                    Err(e) => {
                        warn!(file = %file_path.display(), error = %e, "stopped reading file");
                        report.lines_failed += 1;
                        break;
                    }
                }
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }

                line_no += 1;
                if line_no <= self.settings.skip_lines {
                    report.lines_skipped += 1;
                    continue;
                }

                // a line that is not utf-8 is one failed line, the file goes on
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.to_owned(),
                    Err(e) => {
                        warn!(file = %file_path.display(), line = line_no, error = %e, "skipping line that is not utf-8");
                        report.lines_failed += 1;
                        continue;
                    }
                };

                report.lines_read += 1;
                pending.push((line_no, line));
                if pending.len() == dispatch_size {
                    self.process_batch(std::mem::take(&mut pending), batch_index, &mut report)?;
                    batch_index += 1;
                }
            }
        }

        // the tail is a batch of its own
        if !pending.is_empty() {
            self.process_batch(pending, batch_index, &mut report)?;
        }

        info!(
            lines = report.lines_read,
            skipped = report.lines_skipped,
            failed = report.lines_failed,
            examples = report.examples,
            batches = report.batches_written,
            "finished streaming, took {} seconds",
            timer.elapsed().as_secs()
        );
        Ok(report)
    }

    fn process_batch(&self, lines: Vec<(usize, String)>, batch_index: usize, report: &mut StreamReport) -> Result<()> {

        let n_lines = lines.len();
        let (examples, failed) = self.dispatch(lines)?;
        report.examples += examples;
        report.lines_failed += failed;
        debug!(batch = batch_index, lines = n_lines, examples = examples, failed = failed, "batch drained");

        if self.flushes() {
            let set = self.trainer.take_examples();
            if self.flush(&set, batch_index)? {
                report.batches_written += 1;
            }
        }
        Ok(())
    }

    // only batch mode with a batch size keeps files, incremental mode keeps nothing to write
    fn flushes(&self) -> bool {
        self.trainer.mode() == TrainingMode::Batch && self.settings.batch_lines.is_some() && self.settings.batch_dir.is_some()
    }

    // one task per line, then a bounded wait for all of them
    fn dispatch(&self, lines: Vec<(usize, String)>) -> Result<(usize, usize)> {

        let n_tasks = lines.len();
        let (tx, rx) = mpsc::channel::<LineOutcome>();
        for (line_no, line) in lines {
            let tx = tx.clone();
            let synthesizer = Arc::clone(&self.synthesizer);
            let trainer = Arc::clone(&self.trainer);
            self.pool.spawn(move || {
                let outcome = synthesizer
                .synthesize(&line)
                .and_then(|vectors| trainer.add_examples(vectors));
                let _ = tx.send((line_no, outcome));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.settings.drain_timeout;
        let mut examples = 0;
        let mut failed = 0;
        let mut received = 0;
        while received < n_tasks {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok((_, Ok(n))) => examples += n,
                Ok((line_no, Err(e))) => {
                    warn!(line = line_no, error = %e, "skipping line");
                    failed += 1;
                },
                Err(RecvTimeoutError::Timeout) => {
                    return Err(WsdError::DrainTimeout { minutes: self.settings.drain_timeout.as_secs() / 60 });
                },
                // panicked tasks drop their sender without an answer
                Err(RecvTimeoutError::Disconnected) => {
                    failed += n_tasks - received;
                    break;
                },
            }
            received += 1;
        }
        Ok((examples, failed))
    }

    // writes `<batch_index>.csv[.gz]`; an empty batch writes nothing but keeps its index
    fn flush(&self, set: &ExampleSet, batch_index: usize) -> Result<bool> {

        let batch_dir = match &self.settings.batch_dir {
            Some(dir) => dir,
            None => return Ok(false),
        };
        if set.is_empty() {
            debug!(batch = batch_index, "batch produced no examples, nothing written");
            return Ok(false);
        }

        let file_name = files_handling::batch_file_name(batch_index, self.settings.compress);
        match files_handling::save_output(batch_dir, &file_name, set) {
            Ok(path) => {
                info!(batch = batch_index, examples = set.len(), file = %path.display(), "saved batch");
                Ok(true)
            },
            Err(e) => {
                // a half written batch would be merged on resume
                let _ = fs::remove_file(Path::new(batch_dir).join(&file_name));
                let last_completed = batch_index - 1;
                let skip_lines = last_completed * self.settings.batch_lines.unwrap_or(0);
                error!(batch = batch_index, last_completed = last_completed, skip_lines = skip_lines, "could not persist batch");
                Err(WsdError::Persist { batch: batch_index, last_completed: last_completed, skip_lines: skip_lines, source: Box::new(e) })
            },
        }
    }

}


/// Feeds persisted batch files one at a time into the trainer, which keeps at most one in memory.
pub fn replay_batches(trainer: &Trainer, batch_dir: &str) -> Result<StreamReport> {

    let mut report = StreamReport::default();
    for (index, path) in files_handling::batch_files(batch_dir)? {
        let set: ExampleSet = match files_handling::read_input(&path.display().to_string()) {
            Ok(set) => set,
            Err(e) => {
                warn!(batch = index, error = %e, "skipping unreadable batch file");
                continue;
            }
        };
        let n = set.len();
        report.examples += trainer.add_example_set(set)?;
        debug!(batch = index, examples = n, "replayed batch");
    }
    info!(examples = report.examples, "replayed provided batches");
    Ok(report)
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::classifier::{Classifier, ClassifierMethod};
    use crate::features::{FeatureVector, FeatureVectorBuilder};
    use crate::nlp::{Annotator, LexiconAnnotator, Sentence};
    use std::io::Write;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    const CORPUS: &[&str] = &[
        "The [[Capital of France|capital]] is a large city.",
        "A [[Bank (finance)|bank]] is near the [[River Thames|river]].",
        "[[1997]] was a good year.",
        "plain text without links",
        "The [[river]] is large.",
        "The [[Bank (geography)|bank]] of the [[river]] is large.",
        "The [[city]] is near the [[Capital of France|capital]].",
    ];

    fn lexicon() -> LexiconAnnotator {
        LexiconAnnotator::from_entries(vec![
            ("the", "the", "DT"),
            ("a", "a", "DT"),
            ("capital", "capital", "NN"),
            ("is", "be", "VBZ"),
            ("large", "large", "JJ"),
            ("city", "city", "NN"),
            ("bank", "bank", "NN"),
            ("near", "near", "IN"),
            ("of", "of", "IN"),
            ("river", "river", "NN"),
            ("was", "be", "VBD"),
        ])
    }

    fn synthesizer_over(annotator: Arc<dyn Annotator>) -> Arc<ExampleSynthesizer> {
        Arc::new(ExampleSynthesizer::new(annotator, FeatureVectorBuilder::with_default_filter()).unwrap())
    }

    fn synthesizer() -> Arc<ExampleSynthesizer> {
        synthesizer_over(Arc::new(lexicon()))
    }

    // fails every text that mentions the marker
    struct FailsOn {
        marker: &'static str,
        inner: LexiconAnnotator,
    }

    impl Annotator for FailsOn {
        fn annotate(&self, text: &str) -> Result<Vec<Sentence>> {
            if text.contains(self.marker) {
                return Err(WsdError::Annotation(format!("cannot tag '{}'", self.marker)));
            }
            self.inner.annotate(text)
        }
    }

    struct Stalls(Duration);

    impl Annotator for Stalls {
        fn annotate(&self, _text: &str) -> Result<Vec<Sentence>> {
            std::thread::sleep(self.0);
            Ok(Vec::new())
        }
    }

    fn labels(vectors: &[FeatureVector]) -> Vec<&str> {
        let mut labels: Vec<&str> = vectors.iter().filter_map(|v| v.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    fn settings(num_threads: usize) -> StreamSettings {
        StreamSettings {
            num_threads: num_threads,
            batch_lines: None,
            batch_dir: None,
            compress: false,
            skip_lines: 0,
            drain_timeout: Duration::from_secs(60),
        }
    }

    fn write_corpus(dir: &Path) -> PathBuf {
        let corpus = dir.join("corpus");
        fs::create_dir_all(corpus.join("b")).unwrap();
        fs::write(corpus.join("a.txt"), CORPUS[..3].join("\n")).unwrap();

        // the rest goes to a gzipped file in a sub directory
        let mut gz = GzEncoder::new(File::create(corpus.join("b").join("c.txt.gz")).unwrap(), Compression::default());
        gz.write_all(CORPUS[3..].join("\n").as_bytes()).unwrap();
        gz.finish().unwrap();
        corpus
    }

    fn run(corpus: &Path, settings: StreamSettings) -> (StreamReport, Vec<FeatureVector>) {
        run_over(synthesizer(), corpus, settings)
    }

    fn run_over(synthesizer: Arc<ExampleSynthesizer>, corpus: &Path, settings: StreamSettings) -> (StreamReport, Vec<FeatureVector>) {
        let trainer = Arc::new(Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap());
        let orchestrator = StreamingOrchestrator::new(synthesizer, Arc::clone(&trainer), settings).unwrap();
        let report = orchestrator.run(corpus).unwrap();
        let mut vectors: Vec<FeatureVector> = trainer.take_examples().into_examples().into_iter().map(|e| e.vector).collect();
        vectors.sort();
        (report, vectors)
    }

    #[test]
    fn walks_directories_in_order() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let files = corpus_files(&corpus).unwrap();
        assert_eq!(files, vec![corpus.join("a.txt"), corpus.join("b").join("c.txt.gz")]);
    }

    #[test]
    fn worker_count_does_not_change_examples() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        let (report, single) = run(&corpus, settings(1));
        let (_, many) = run(&corpus, settings(4));

        assert_eq!(report.lines_read, CORPUS.len());
        assert_eq!(report.lines_failed, 0);
        assert_eq!(report.examples, single.len());
        assert!(single.len() >= 6);
        assert_eq!(single, many);
    }

    #[test]
    fn batches_are_persisted_and_resumable() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let batch_dir = dir.path().join("batches").display().to_string();

        let mut s = settings(2);
        s.batch_lines = Some(2);
        s.batch_dir = Some(batch_dir.clone());
        let (report, left_in_memory) = run(&corpus, s.clone());
        assert!(left_in_memory.is_empty());

        // lines 3 and 4 hold the numeric link and a plain line, so batch 2 is empty
        let (_, all) = run(&corpus, settings(1));
        let indices: Vec<usize> = files_handling::batch_files(&batch_dir).unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(report.batches_written, 3);

        let merged: ExampleSet = files_handling::read_input(&batch_dir).unwrap();
        let mut merged: Vec<FeatureVector> = merged.into_examples().into_iter().map(|e| e.vector).collect();
        merged.sort();
        assert_eq!(merged, all);

        // resuming after two batches rewrites from batch 3 on
        fs::remove_dir_all(&batch_dir).unwrap();
        s.skip_lines = 4;
        let (report, _) = run(&corpus, s);
        assert_eq!(report.lines_skipped, 4);
        let indices: Vec<usize> = files_handling::batch_files(&batch_dir).unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![3, 4]);
    }

    #[test]
    fn persist_failure_reports_resume_point() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        // a regular file where the batch directory should be
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, "").unwrap();

        let mut s = settings(2);
        s.batch_lines = Some(2);
        s.batch_dir = Some(blocked.display().to_string());
        s.skip_lines = 2;

        let trainer = Arc::new(Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap());
        let orchestrator = StreamingOrchestrator::new(synthesizer(), trainer, s).unwrap();
        match orchestrator.run(&corpus) {
            Err(WsdError::Persist { batch, last_completed, skip_lines, .. }) => {
                // lines 3 and 4 make an empty batch 2, batch 3 is the first write
                assert_eq!((batch, last_completed, skip_lines), (3, 2, 4));
            },
            other => panic!("expected a persist failure, got {:?}", other.map(|r| r.batches_written)),
        }
    }

    #[test]
    fn incremental_replay_of_provided_batches() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let batch_dir = dir.path().join("batches").display().to_string();

        let mut s = settings(2);
        s.batch_lines = Some(3);
        s.batch_dir = Some(batch_dir.clone());
        s.compress = true;
        let (report, _) = run(&corpus, s);

        let trainer = Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Incremental).unwrap();
        let replayed = replay_batches(&trainer, &batch_dir).unwrap();

        assert_eq!(replayed.examples, report.examples);
        assert_eq!(trainer.examples_seen(), report.examples);
        assert!(trainer.current_model().is_some());
    }

    #[test]
    fn line_that_is_not_utf8_is_skipped() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        fs::write(&corpus, b"The [[city]] is large.\n\xff\xfe broken\nThe [[river]] is large.\n").unwrap();

        let (report, vectors) = run(&corpus, settings(2));
        assert_eq!(report.lines_failed, 1);
        assert_eq!(report.lines_read, 2);
        assert_eq!(labels(&vectors), vec!["city", "river"]);
    }

    #[test]
    fn failing_line_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        fs::write(&corpus, "The [[city]] is large.\nThe [[bank]] is broken.\nThe [[river]] is large.").unwrap();

        let synthesizer = synthesizer_over(Arc::new(FailsOn { marker: "broken", inner: lexicon() }));
        let (report, vectors) = run_over(synthesizer, &corpus, settings(2));
        assert_eq!(report.lines_read, 3);
        assert_eq!(report.lines_failed, 1);
        assert_eq!(report.examples, vectors.len());
        assert_eq!(labels(&vectors), vec!["city", "river"]);
    }

    #[test]
    fn stalled_workers_hit_the_drain_timeout() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        let mut s = settings(1);
        s.drain_timeout = Duration::from_millis(50);
        let trainer = Arc::new(Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap());
        let synthesizer = synthesizer_over(Arc::new(Stalls(Duration::from_secs(1))));
        let orchestrator = StreamingOrchestrator::new(synthesizer, trainer, s).unwrap();

        assert!(matches!(orchestrator.run(&corpus), Err(WsdError::DrainTimeout { .. })));
    }

    #[test]
    fn incremental_run_keeps_a_model_and_no_examples() {
        let dir = tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let batch_dir = dir.path().join("batches");

        let mut s = settings(2);
        s.batch_lines = Some(2);
        s.batch_dir = Some(batch_dir.display().to_string());
        let trainer = Arc::new(Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Incremental).unwrap());
        let orchestrator = StreamingOrchestrator::new(synthesizer(), Arc::clone(&trainer), s).unwrap();
        let report = orchestrator.run(&corpus).unwrap();

        let (_, batch) = run(&corpus, settings(1));
        assert_eq!(report.examples, batch.len());
        assert_eq!(trainer.examples_seen(), report.examples);
        assert!(trainer.take_examples().is_empty());
        assert_eq!(report.batches_written, 0);
        assert!(!batch_dir.exists());

        let model = trainer.current_model().unwrap();
        let prediction = model.learner.predict(&batch[0]).unwrap();
        assert!(batch.iter().any(|v| v.label() == Some(prediction.label.as_str())));
    }
}
