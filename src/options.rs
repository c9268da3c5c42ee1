/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use std::num::ParseIntError;

use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
pub struct Options {
    #[structopt(
        long = "initialHeapSize",
        help = "Heap size that triggers the first collection (default 10MB)",
        default_value = "10MB",
        parse(try_from_str = parse_size_from_str))]
    pub initial_heap_size: usize,
    #[structopt(
        long = "minHeapSize",
        help = "Heap size the collector will not pace below (default 1MB)",
        default_value = "1MB",
        parse(try_from_str = parse_size_from_str))]
    pub min_heap_size: usize,
    #[structopt(
        long = "heapGrowthPercent",
        default_value = "50",
        help = "How much the allocation ceiling grows past the live size after a collection"
    )]
    pub heap_growth_percent: usize,
    #[structopt(
        long = "gcStress",
        help = "Collect before every allocation to shake out missing roots"
    )]
    pub gc_stress: bool,
    #[structopt(long = "verboseGC", help = "Verbose GC cycle")]
    pub verbose_gc: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            initial_heap_size: 10 * 1024 * 1024,
            min_heap_size: 1024 * 1024,
            heap_growth_percent: 50,
            gc_stress: false,
            verbose_gc: false,
        }
    }
}

// for configure
impl Options {
    pub fn with_initial_heap_size(mut self, size: usize) -> Self {
        self.initial_heap_size = size;
        self
    }

    pub fn with_min_heap_size(mut self, size: usize) -> Self {
        self.min_heap_size = size;
        self
    }

    pub fn with_heap_growth_percent(mut self, percent: usize) -> Self {
        self.heap_growth_percent = percent;
        self
    }

    pub fn with_gc_stress(mut self, enable: bool) -> Self {
        self.gc_stress = enable;
        self
    }

    pub fn with_verbose_gc(mut self, enable: bool) -> Self {
        self.verbose_gc = enable;
        self
    }
}

fn parse_size_from_str(s: &str) -> Result<usize, ParseIntError> {
    let text = s.trim().to_lowercase();

    // Peel a unit suffix off the digits, if there is one.
    let suffixes: [(&str, usize); 6] = [
        ("gb", 1 << 30),
        ("mb", 1 << 20),
        ("kb", 1 << 10),
        ("g", 1 << 30),
        ("m", 1 << 20),
        ("k", 1 << 10),
    ];
    for (suffix, multiplier) in suffixes.iter() {
        if let Some(digits) = text.strip_suffix(suffix) {
            return digits.parse::<usize>().map(|n| n * multiplier);
        }
    }

    text.parse::<usize>()
}
