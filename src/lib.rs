/*!
`lithomark` converts a raster image into a multi-layer, printable 3D bookmark:
a thin rounded-rectangle base whose top surface is built up in discrete
extruded layers, one per quantized color.

The pipeline is pure CPU work and runs in a few seconds on images up to a few
megapixels: stratified sampling, k-means color quantization, connected-region
extraction, marching-squares contour tracing, ear-clipping triangulation,
prism extrusion, mesh simplification and printability validation. The single
entry point is [`generate`].

The crate consumes a decoded [`Pixmap`] and emits a [`Geometry`] value; image
decoding (except the optional `png-format` feature) and STL/3MF serialization
are the host's responsibility.

```no_run
use lithomark::{generate, CancelSignal, NullProgress, Params, Pixmap};

let pixmap = Pixmap::new(256, 256).unwrap();
let output = generate(
    &pixmap,
    &Params::default(),
    42,
    &NullProgress,
    &CancelSignal::new(),
).unwrap();
println!("{} triangles", output.geometry.metrics.triangle_count);
```
*/

#![warn(missing_docs)]
#![warn(missing_copy_implementations)]
#![warn(missing_debug_implementations)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::comparison_chain)]
#![allow(clippy::float_cmp)]
#![allow(clippy::identity_op)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

mod color;
mod contour;
mod error;
mod extrude;
mod mesh;
mod params;
mod pipeline;
mod pixmap;
mod pool;
mod progress;
mod quantizer;
mod regions;
mod sampler;
mod simplify;
mod triangulate;
mod validate;

pub use lithomark_geom::{Box3, IntRect, IntSize, Point, Point3};

pub use color::{ColorU8, Palette, MAX_COLORS, VOID_ALPHA_THRESHOLD};
pub use contour::Contour;
pub use error::Error;
pub use mesh::{Geometry, Layer, Metrics};
pub use params::{Params, MAX_TOTAL_HEIGHT};
pub use pipeline::{generate, PipelineOutput};
pub use pixmap::{Pixmap, BYTES_PER_PIXEL, MAX_DIMENSION};
pub use progress::{
    CancelReason, CancelSignal, NullProgress, ProgressEvent, ProgressSink, Stage,
};
pub use quantizer::{QuantizedImage, VOID_INDEX};
pub use regions::{Component, MIN_COMPONENT_AREA};
pub use sampler::MAX_SAMPLES;
pub use validate::{Issue, PrintabilityReport, Severity};
