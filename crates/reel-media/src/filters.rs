//! Filter graph builder.
//!
//! Pure functions compiling a [`TransformRequest`] into an [`EnginePlan`]: the
//! filter graph plus every engine argument needed to run it. Nothing here
//! reads the environment or the filesystem, so the same request always
//! compiles to the same plan.

use std::path::{Path, PathBuf};

use reel_models::{
    Background, ChromaKeyOptions, Color, MergeOptions, Operation, RemoveBackgroundMode,
    TransformRequest,
};

use crate::command::{EngineInput, FfmpegCommand};
use crate::graph::{FilterChain, FilterGraph};
use crate::progress::Timeline;

// =============================================================================
// Constants
// =============================================================================

/// Canonical merge canvas.
pub const MERGE_WIDTH: u32 = 1920;
pub const MERGE_HEIGHT: u32 = 1080;

/// Enhance upscale target.
pub const ENHANCE_WIDTH: u32 = 3840;
pub const ENHANCE_HEIGHT: u32 = 2160;

/// Auto background removal working resolution.
pub const AUTO_WIDTH: u32 = 1280;
pub const AUTO_HEIGHT: u32 = 720;

/// Audio bitrate for re-encoded audio.
pub const AUDIO_BITRATE: &str = "192k";

/// Noise suppression chain, in order. Denoise before the notches; gate last.
pub const CLEAN_AUDIO_STAGES: &[&str] = &[
    "highpass=f=100",
    "lowpass=f=11000",
    "afftdn=nr=16:nf=-55:tn=1",
    "afftdn=nr=12:nf=-48:tn=1",
    // fan fundamental and harmonics
    "equalizer=f=120:width_type=h:width=50:g=-10",
    "equalizer=f=240:width_type=h:width=50:g=-8",
    "equalizer=f=360:width_type=h:width=50:g=-6",
    "equalizer=f=650:width_type=h:width=200:g=-9",
    "agate=threshold=-42dB:ratio=4:attack=10:release=150",
    "highpass=f=100",
];

/// Upscale, sharpen, grade, then denoise the grain the first two exposed.
pub const ENHANCE_STAGES: &[&str] = &[
    "scale=3840:2160:flags=lanczos",
    "unsharp=5:5:1.0:5:5:0.0",
    "eq=saturation=1.1:contrast=1.05",
    "hqdn3d=1.5:1.5:6:6",
];

/// Auto mode keys white with looser settings than the chroma key defaults.
pub const AUTO_KEY_SIMILARITY: f64 = 0.4;
pub const AUTO_KEY_BLEND: f64 = 0.15;

/// Final output pad of complex graphs.
const OUT: &str = "out";

// =============================================================================
// Plan
// =============================================================================

/// How the graph is handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphArg {
    /// `-af`: single audio chain on the only input.
    Audio(FilterGraph),
    /// `-vf`: single video chain on the only input.
    Video(FilterGraph),
    /// `-filter_complex`: labeled multi-input graph.
    Complex(FilterGraph),
}

impl GraphArg {
    pub fn graph(&self) -> &FilterGraph {
        match self {
            GraphArg::Audio(g) | GraphArg::Video(g) | GraphArg::Complex(g) => g,
        }
    }
}

/// A compiled transform: inputs, graph and output arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct EnginePlan {
    pub inputs: Vec<EngineInput>,
    pub graph: GraphArg,
    /// Stream maps, codecs and container flags, in order.
    pub output_args: Vec<String>,
    /// Which input durations add up to the output duration.
    pub timeline: Timeline,
    /// Status shown when the engine starts.
    pub start_status: &'static str,
    /// Prefix of `"<label>: N%"` progress statuses.
    pub progress_label: &'static str,
}

impl EnginePlan {
    /// Full engine command writing to `output`.
    pub fn command(&self, output: impl AsRef<Path>) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(output).inputs(self.inputs.iter().cloned());
        let cmd = match &self.graph {
            GraphArg::Audio(g) => cmd.audio_filter(g),
            GraphArg::Video(g) => cmd.video_filter(g),
            GraphArg::Complex(g) => cmd.filter_complex(g),
        };
        cmd.output_args(self.output_args.iter().cloned())
    }

    /// Status text for a running percentage.
    pub fn progress_status(&self, percent: u8) -> String {
        format!("{}: {}%", self.progress_label, percent)
    }
}

/// Compile a request into its engine plan.
pub fn build_plan(request: &TransformRequest) -> EnginePlan {
    let inputs = request.inputs();
    match request.operation() {
        Operation::CleanAudio => clean_audio_plan(&inputs[0]),
        Operation::Merge(options) => merge_plan(inputs, options),
        Operation::Enhance => enhance_plan(&inputs[0]),
        Operation::RemoveBackground(RemoveBackgroundMode::ChromaKey(options)) => {
            chroma_key_plan(&inputs[0], options)
        }
        Operation::RemoveBackground(RemoveBackgroundMode::Auto { background_color }) => {
            auto_background_plan(&inputs[0], background_color)
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Fixed denoise chain; video is stream-copied.
pub fn clean_audio_plan(input: &Path) -> EnginePlan {
    let chain = CLEAN_AUDIO_STAGES
        .iter()
        .fold(FilterChain::new(), |chain, stage| chain.filter(*stage));

    EnginePlan {
        inputs: vec![EngineInput::new(input)],
        graph: GraphArg::Audio(FilterGraph::new().chain(chain)),
        output_args: args(&[
            "-map", "0:v?", "-map", "0:a", "-c:v", "copy", "-c:a", "aac", "-b:a", AUDIO_BITRATE,
        ]),
        timeline: Timeline::Primary,
        start_status: "Starting maximum noise reduction...",
        progress_label: "Cleaning audio",
    }
}

/// Letterbox every input onto the canonical canvas, then concatenate in order.
pub fn merge_plan(inputs: &[PathBuf], options: &MergeOptions) -> EnginePlan {
    let mut graph = FilterGraph::new();
    let mut concat = FilterChain::new();

    for index in 0..inputs.len() {
        let video_pad = format!("v{index}");
        graph.push(letterbox_chain(index, &video_pad));

        let audio_pad = match options.silent_input(index) {
            Some(silent) => {
                let pad = format!("a{index}");
                graph.push(
                    FilterChain::new()
                        .filter("anullsrc=channel_layout=stereo:sample_rate=48000")
                        .filter(format!("atrim=duration={:.3}", silent.duration_secs))
                        .output(pad.clone()),
                );
                pad
            }
            None => format!("{index}:a"),
        };

        concat = concat.input(video_pad).input(audio_pad);
    }

    graph.push(
        concat
            .filter(format!("concat=n={}:v=1:a=1", inputs.len()))
            .output("v")
            .output("a"),
    );

    EnginePlan {
        inputs: inputs.iter().map(EngineInput::new).collect(),
        graph: GraphArg::Complex(graph),
        output_args: args(&[
            "-map", "[v]", "-map", "[a]", "-c:v", "libx264", "-preset", "medium", "-crf", "18",
            "-c:a", "aac", "-b:a", AUDIO_BITRATE, "-movflags", "+faststart",
        ]),
        timeline: Timeline::Concatenated,
        start_status: "Starting merge process...",
        progress_label: "Merging videos",
    }
}

/// Fit inside the canvas, pad the remainder black and square the pixels.
fn letterbox_chain(index: usize, output: &str) -> FilterChain {
    FilterChain::new()
        .input(format!("{index}:v"))
        .filter(format!(
            "scale={MERGE_WIDTH}:{MERGE_HEIGHT}:force_original_aspect_ratio=decrease"
        ))
        .filter(format!(
            "pad={MERGE_WIDTH}:{MERGE_HEIGHT}:(ow-iw)/2:(oh-ih)/2"
        ))
        .filter("setsar=1")
        .output(output)
}

/// Fixed 4K enhancement chain; audio is stream-copied.
pub fn enhance_plan(input: &Path) -> EnginePlan {
    let chain = ENHANCE_STAGES
        .iter()
        .fold(FilterChain::new(), |chain, stage| chain.filter(*stage));

    EnginePlan {
        inputs: vec![EngineInput::new(input)],
        graph: GraphArg::Video(FilterGraph::new().chain(chain)),
        output_args: args(&[
            "-c:v", "libx264", "-preset", "medium", "-crf", "18", "-c:a", "copy", "-movflags",
            "+faststart",
        ]),
        timeline: Timeline::Primary,
        start_status: "Starting video enhancement...",
        progress_label: "Enhancing to 4K",
    }
}

/// Key, despill, then overlay the subject on the replacement background.
pub fn chroma_key_plan(input: &Path, options: &ChromaKeyOptions) -> EnginePlan {
    let key = format!(
        "chromakey={}:similarity={}:blend={}",
        options.key_color.as_ffmpeg(),
        options.similarity,
        options.blend
    );
    let despill = format!("despill=type={}", options.key_color.despill_type());

    let mut inputs = vec![EngineInput::new(input)];
    let mut graph = FilterGraph::new();

    let shortest = match &options.background {
        Background::Image(image) => {
            inputs.push(EngineInput::looped(image));
            graph.push(
                FilterChain::new()
                    .input("1:v")
                    .input("0:v")
                    .filter("scale2ref=w=iw:h=ih:flags=fast_bilinear")
                    .output("bg")
                    .output("fg"),
            );
            true
        }
        Background::Color(color) => {
            graph.push(
                FilterChain::new()
                    .input("0:v")
                    .filter("split=2")
                    .output("fg")
                    .output("base"),
            );
            graph.push(
                FilterChain::new()
                    .input("base")
                    .filter(format!(
                        "drawbox=c={}@1.0:replace=1:t=fill",
                        color.as_ffmpeg()
                    ))
                    .output("bg"),
            );
            false
        }
    };

    graph.push(FilterChain::new().input("fg").filter(key).output("keyed"));
    graph.push(
        FilterChain::new()
            .input("keyed")
            .filter(despill)
            .output("despilled"),
    );
    graph.push(
        FilterChain::new()
            .input("bg")
            .input("despilled")
            .filter(if shortest {
                "overlay=format=auto:shortest=1"
            } else {
                "overlay=format=auto"
            })
            .output(OUT),
    );

    EnginePlan {
        inputs,
        graph: GraphArg::Complex(graph),
        output_args: args(&[
            "-map", "[out]", "-map", "0:a?", "-c:v", "libx264", "-preset", "faster", "-crf", "23",
            "-pix_fmt", "yuv420p", "-c:a", "copy", "-movflags", "+faststart", "-threads", "0",
        ]),
        timeline: Timeline::Primary,
        start_status: "Starting optimized background removal...",
        progress_label: "Removing background",
    }
}

/// Fast fallback: 720p, key white, overlay on a generated canvas.
pub fn auto_background_plan(input: &Path, background: &Color) -> EnginePlan {
    let graph = FilterGraph::new()
        .chain(
            FilterChain::new()
                .input("0:v")
                .filter(format!(
                    "scale={AUTO_WIDTH}:{AUTO_HEIGHT}:flags=fast_bilinear"
                ))
                .output("scaled"),
        )
        .chain(
            FilterChain::new()
                .filter(format!(
                    "color=c={}:s={AUTO_WIDTH}x{AUTO_HEIGHT}",
                    background.as_ffmpeg()
                ))
                .output("bg"),
        )
        .chain(
            FilterChain::new()
                .input("scaled")
                .filter(format!(
                    "chromakey=white:similarity={AUTO_KEY_SIMILARITY}:blend={AUTO_KEY_BLEND}"
                ))
                .output("keyed"),
        )
        .chain(
            FilterChain::new()
                .input("bg")
                .input("keyed")
                .filter("overlay=shortest=1")
                .output(OUT),
        );

    EnginePlan {
        inputs: vec![EngineInput::new(input)],
        graph: GraphArg::Complex(graph),
        output_args: args(&[
            "-map", "[out]", "-map", "0:a?", "-c:v", "libx264", "-preset", "ultrafast", "-crf",
            "28", "-tune", "fastdecode", "-pix_fmt", "yuv420p", "-c:a", "copy", "-movflags",
            "+faststart", "-threads", "0",
        ]),
        timeline: Timeline::Primary,
        start_status: "Detecting and removing background...",
        progress_label: "Auto removing background",
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{KeyColor, RemoveBackgroundForm, SilentInput};

    fn request(operation: Operation, inputs: &[&str]) -> TransformRequest {
        TransformRequest::new(operation, inputs.iter().map(PathBuf::from).collect()).unwrap()
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_clean_audio_chain_order() {
        let plan = build_plan(&request(Operation::CleanAudio, &["in.mp4"]));
        let GraphArg::Audio(graph) = &plan.graph else {
            panic!("clean audio must use -af");
        };

        assert_eq!(
            graph.to_string(),
            "highpass=f=100,lowpass=f=11000,afftdn=nr=16:nf=-55:tn=1,afftdn=nr=12:nf=-48:tn=1,\
             equalizer=f=120:width_type=h:width=50:g=-10,equalizer=f=240:width_type=h:width=50:g=-8,\
             equalizer=f=360:width_type=h:width=50:g=-6,equalizer=f=650:width_type=h:width=200:g=-9,\
             agate=threshold=-42dB:ratio=4:attack=10:release=150,highpass=f=100"
        );

        let denoise = graph.last_position_of("afftdn").unwrap();
        let first_eq = graph.position_of("equalizer").unwrap();
        let gate = graph.position_of("agate").unwrap();
        assert!(denoise < first_eq && first_eq < gate);
        assert_eq!(graph.last_position_of("highpass"), Some(graph.stages().count() - 1));
    }

    #[test]
    fn test_clean_audio_copies_video_and_reencodes_audio() {
        let plan = clean_audio_plan(Path::new("in.mp4"));
        assert_eq!(arg_after(&plan.output_args, "-c:v"), Some("copy"));
        assert_eq!(arg_after(&plan.output_args, "-c:a"), Some("aac"));
        assert_eq!(arg_after(&plan.output_args, "-b:a"), Some("192k"));
    }

    #[test]
    fn test_clean_audio_compiles_without_knowing_input_streams() {
        // Audio-less inputs still get the full chain; the engine reports the failure.
        let plan = build_plan(&request(Operation::CleanAudio, &["silent_screen_capture.mp4"]));
        assert_eq!(plan.graph.graph().stages().count(), CLEAN_AUDIO_STAGES.len());
    }

    #[test]
    fn test_merge_letterboxes_every_input_before_concat() {
        let plan = build_plan(&request(Operation::merge(), &["a_720p.mp4", "b_1080p.mp4"]));
        let GraphArg::Complex(graph) = &plan.graph else {
            panic!("merge must use -filter_complex");
        };

        assert_eq!(
            graph.to_string(),
            "[0:v]scale=1920:1080:force_original_aspect_ratio=decrease,\
             pad=1920:1080:(ow-iw)/2:(oh-ih)/2,setsar=1[v0];\
             [1:v]scale=1920:1080:force_original_aspect_ratio=decrease,\
             pad=1920:1080:(ow-iw)/2:(oh-ih)/2,setsar=1[v1];\
             [v0][0:a][v1][1:a]concat=n=2:v=1:a=1[v][a]"
        );

        let concat = graph.position_of("concat").unwrap();
        assert_eq!(graph.last_position_of("setsar"), Some(concat - 1));
        assert_eq!(plan.timeline, Timeline::Concatenated);
    }

    #[test]
    fn test_merge_scales_all_inputs_for_any_count() {
        let names: Vec<String> = (0..5).map(|i| format!("clip{i}.mov")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let plan = build_plan(&request(Operation::merge(), &refs));
        let rendered = plan.graph.graph().to_string();

        for i in 0..5 {
            assert!(rendered.contains(&format!("[{i}:v]scale=1920:1080:force_original_aspect_ratio=decrease")));
        }
        assert!(rendered.contains("concat=n=5:v=1:a=1[v][a]"));
        assert_eq!(plan.inputs.len(), 5);
    }

    #[test]
    fn test_merge_synthesizes_silence_for_audioless_inputs() {
        let op = Operation::Merge(MergeOptions {
            silent_inputs: vec![SilentInput {
                index: 1,
                duration_secs: 4.5,
            }],
        });
        let plan = build_plan(&request(op, &["a.mp4", "b.mp4"]));
        let rendered = plan.graph.graph().to_string();

        assert!(rendered.contains(
            "anullsrc=channel_layout=stereo:sample_rate=48000,atrim=duration=4.500[a1]"
        ));
        assert!(rendered.contains("[v0][0:a][v1][a1]concat=n=2"));
    }

    #[test]
    fn test_merge_output_arguments() {
        let plan = build_plan(&request(Operation::merge(), &["a.mp4", "b.mp4"]));
        let cmd = plan.command("merged.mp4").build_args();
        let joined = cmd.join(" ");
        assert!(joined.contains("-i a.mp4 -i b.mp4 -filter_complex"));
        assert!(joined.contains("-map [v] -map [a] -c:v libx264 -preset medium -crf 18"));
        assert!(joined.ends_with("-movflags +faststart merged.mp4"));
    }

    #[test]
    fn test_enhance_chain_order() {
        let plan = build_plan(&request(Operation::Enhance, &["in.mp4"]));
        let GraphArg::Video(graph) = &plan.graph else {
            panic!("enhance must use -vf");
        };
        let scale = graph.position_of("scale").unwrap();
        let sharpen = graph.position_of("unsharp").unwrap();
        let grade = graph.position_of("eq").unwrap();
        let denoise = graph.position_of("hqdn3d").unwrap();
        assert!(scale < sharpen && sharpen < grade && grade < denoise);
        assert!(graph.to_string().starts_with("scale=3840:2160:flags=lanczos"));
        assert_eq!(arg_after(&plan.output_args, "-c:a"), Some("copy"));
    }

    #[test]
    fn test_chroma_key_despill_between_key_and_overlay() {
        for key in ["green", "blue", "white", "#3366ff"] {
            let form = RemoveBackgroundForm {
                chroma_key_color: key.to_string(),
                ..Default::default()
            };
            let plan = build_plan(&request(form.into_operation(None).unwrap(), &["in.mp4"]));
            let graph = plan.graph.graph();

            let key_pos = graph.position_of("chromakey").unwrap();
            let despill = graph.position_of("despill").unwrap();
            let overlay = graph.last_position_of("overlay").unwrap();
            assert!(key_pos < despill && despill < overlay, "key colour {key}");
        }
    }

    #[test]
    fn test_chroma_key_solid_colour_background() {
        let plan = chroma_key_plan(Path::new("in.mp4"), &ChromaKeyOptions::default());
        assert_eq!(
            plan.graph.graph().to_string(),
            "[0:v]split=2[fg][base];\
             [base]drawbox=c=0xFFFFFF@1.0:replace=1:t=fill[bg];\
             [fg]chromakey=green:similarity=0.1:blend=0.05[keyed];\
             [keyed]despill=type=green[despilled];\
             [bg][despilled]overlay=format=auto[out]"
        );
        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(arg_after(&plan.output_args, "-preset"), Some("faster"));
    }

    #[test]
    fn test_chroma_key_image_background_is_looped_input() {
        let options = ChromaKeyOptions {
            key_color: KeyColor::Blue,
            background: Background::Image(PathBuf::from("bg.png")),
            ..Default::default()
        };
        let plan = chroma_key_plan(Path::new("in.mp4"), &options);

        assert_eq!(plan.inputs[1], EngineInput::looped("bg.png"));
        let rendered = plan.graph.graph().to_string();
        assert!(rendered.starts_with("[1:v][0:v]scale2ref=w=iw:h=ih:flags=fast_bilinear[bg][fg]"));
        assert!(rendered.ends_with("[bg][despilled]overlay=format=auto:shortest=1[out]"));
        assert!(!rendered.contains("movie="));
    }

    #[test]
    fn test_overlay_puts_background_first() {
        let plan = chroma_key_plan(Path::new("in.mp4"), &ChromaKeyOptions::default());
        let last = plan.graph.graph().chains().last().unwrap();
        assert_eq!(last.inputs(), ["bg".to_string(), "despilled".to_string()]);
    }

    #[test]
    fn test_auto_mode_ignores_caller_keying_options() {
        let form = RemoveBackgroundForm {
            mode: "auto".to_string(),
            similarity: 0.5,
            blend: 0.3,
            background_color: "#000000".to_string(),
            ..Default::default()
        };
        let plan = build_plan(&request(form.into_operation(None).unwrap(), &["in.mp4"]));
        let rendered = plan.graph.graph().to_string();

        assert!(rendered.contains("scale=1280:720:flags=fast_bilinear"));
        assert!(rendered.contains("color=c=0x000000:s=1280x720"));
        assert!(rendered.contains("chromakey=white:similarity=0.4:blend=0.15"));
        assert!(!rendered.contains("similarity=0.5"));
        assert_eq!(arg_after(&plan.output_args, "-preset"), Some("ultrafast"));
        assert_eq!(arg_after(&plan.output_args, "-crf"), Some("28"));
        assert_eq!(arg_after(&plan.output_args, "-tune"), Some("fastdecode"));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let req = request(Operation::merge(), &["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(build_plan(&req), build_plan(&req));
    }

    #[test]
    fn test_progress_status_format() {
        let plan = enhance_plan(Path::new("in.mp4"));
        assert_eq!(plan.progress_status(42), "Enhancing to 4K: 42%");
    }
}
