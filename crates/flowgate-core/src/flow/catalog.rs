//! Model catalog: serving-name to Flow backend mapping.
//!
//! Each serving id encodes family and orientation. Image families call
//! the synchronous image endpoint; video families submit async tasks.

use flowgate_types::models::{GenerationKind, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    TextVideo,
    FrameVideo,
    ReferenceVideo,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: &'static str,
    pub family: MediaFamily,
    /// Backend model name (image) or video model key.
    pub backend_name: &'static str,
    pub aspect_ratio: &'static str,
    pub orientation: Orientation,
    pub description: &'static str,
}

impl ModelSpec {
    pub fn is_video(&self) -> bool {
        self.family != MediaFamily::Image
    }

    /// Effective generation kind given the number of attached images.
    pub fn kind_for(&self, image_count: usize) -> GenerationKind {
        match self.family {
            MediaFamily::Image if image_count > 0 => GenerationKind::ImageToImage,
            MediaFamily::Image => GenerationKind::TextToImage,
            MediaFamily::TextVideo => GenerationKind::TextToVideo,
            MediaFamily::FrameVideo if image_count >= 2 => GenerationKind::FirstLastFrame,
            MediaFamily::FrameVideo => GenerationKind::ImageToVideo,
            MediaFamily::ReferenceVideo => GenerationKind::ReferenceToVideo,
        }
    }
}

macro_rules! image_pair {
    ($base:literal, $backend:literal, $desc:literal) => {
        [
            ModelSpec {
                id: concat!($base, "-landscape"),
                family: MediaFamily::Image,
                backend_name: $backend,
                aspect_ratio: "IMAGE_ASPECT_RATIO_LANDSCAPE",
                orientation: Orientation::Landscape,
                description: $desc,
            },
            ModelSpec {
                id: concat!($base, "-portrait"),
                family: MediaFamily::Image,
                backend_name: $backend,
                aspect_ratio: "IMAGE_ASPECT_RATIO_PORTRAIT",
                orientation: Orientation::Portrait,
                description: $desc,
            },
        ]
    };
}

macro_rules! video_entry {
    ($id:literal, $family:expr, $key:literal, portrait, $desc:literal) => {
        ModelSpec {
            id: $id,
            family: $family,
            backend_name: $key,
            aspect_ratio: "VIDEO_ASPECT_RATIO_PORTRAIT",
            orientation: Orientation::Portrait,
            description: $desc,
        }
    };
    ($id:literal, $family:expr, $key:literal, landscape, $desc:literal) => {
        ModelSpec {
            id: $id,
            family: $family,
            backend_name: $key,
            aspect_ratio: "VIDEO_ASPECT_RATIO_LANDSCAPE",
            orientation: Orientation::Landscape,
            description: $desc,
        }
    };
}

const IMAGE_GEMINI_25: [ModelSpec; 2] =
    image_pair!("gemini-2.5-flash-image", "GEM_PIX", "Gemini 2.5 Flash image generation");
const IMAGE_GEMINI_30: [ModelSpec; 2] =
    image_pair!("gemini-3.0-pro-image", "GEM_PIX_2", "Gemini 3.0 Pro image generation");
const IMAGE_IMAGEN: [ModelSpec; 2] =
    image_pair!("imagen-4.0-generate-preview", "IMAGEN_3_5", "Imagen 4.0 image generation");

const VIDEO_MODELS: [ModelSpec; 14] = [
    // text to video
    video_entry!(
        "veo_3_1_t2v_fast_portrait",
        MediaFamily::TextVideo,
        "veo_3_1_t2v_fast_portrait",
        portrait,
        "Veo 3.1 fast text-to-video"
    ),
    video_entry!(
        "veo_3_1_t2v_fast_landscape",
        MediaFamily::TextVideo,
        "veo_3_1_t2v_fast",
        landscape,
        "Veo 3.1 fast text-to-video"
    ),
    video_entry!(
        "veo_2_1_fast_d_15_t2v_portrait",
        MediaFamily::TextVideo,
        "veo_2_1_fast_d_15_t2v",
        portrait,
        "Veo 2.1 fast text-to-video"
    ),
    video_entry!(
        "veo_2_1_fast_d_15_t2v_landscape",
        MediaFamily::TextVideo,
        "veo_2_1_fast_d_15_t2v",
        landscape,
        "Veo 2.1 fast text-to-video"
    ),
    video_entry!(
        "veo_2_0_t2v_portrait",
        MediaFamily::TextVideo,
        "veo_2_0_t2v",
        portrait,
        "Veo 2.0 text-to-video"
    ),
    video_entry!(
        "veo_2_0_t2v_landscape",
        MediaFamily::TextVideo,
        "veo_2_0_t2v",
        landscape,
        "Veo 2.0 text-to-video"
    ),
    // start/end frame to video (1 image = start frame, 2 = both)
    video_entry!(
        "veo_3_1_i2v_s_fast_fl_portrait",
        MediaFamily::FrameVideo,
        "veo_3_1_i2v_s_fast_fl",
        portrait,
        "Veo 3.1 fast image-to-video"
    ),
    video_entry!(
        "veo_3_1_i2v_s_fast_fl_landscape",
        MediaFamily::FrameVideo,
        "veo_3_1_i2v_s_fast_fl",
        landscape,
        "Veo 3.1 fast image-to-video"
    ),
    video_entry!(
        "veo_2_1_fast_d_15_i2v_portrait",
        MediaFamily::FrameVideo,
        "veo_2_1_fast_d_15_i2v",
        portrait,
        "Veo 2.1 fast image-to-video"
    ),
    video_entry!(
        "veo_2_1_fast_d_15_i2v_landscape",
        MediaFamily::FrameVideo,
        "veo_2_1_fast_d_15_i2v",
        landscape,
        "Veo 2.1 fast image-to-video"
    ),
    video_entry!(
        "veo_2_0_i2v_portrait",
        MediaFamily::FrameVideo,
        "veo_2_0_i2v",
        portrait,
        "Veo 2.0 image-to-video"
    ),
    video_entry!(
        "veo_2_0_i2v_landscape",
        MediaFamily::FrameVideo,
        "veo_2_0_i2v",
        landscape,
        "Veo 2.0 image-to-video"
    ),
    // reference images to video (any number of images)
    video_entry!(
        "veo_3_0_r2v_fast_portrait",
        MediaFamily::ReferenceVideo,
        "veo_3_0_r2v_fast",
        portrait,
        "Veo 3.0 fast reference-to-video"
    ),
    video_entry!(
        "veo_3_0_r2v_fast_landscape",
        MediaFamily::ReferenceVideo,
        "veo_3_0_r2v_fast",
        landscape,
        "Veo 3.0 fast reference-to-video"
    ),
];

/// All serving models, image families first.
pub fn all_models() -> impl Iterator<Item = &'static ModelSpec> {
    IMAGE_GEMINI_25
        .iter()
        .chain(IMAGE_GEMINI_30.iter())
        .chain(IMAGE_IMAGEN.iter())
        .chain(VIDEO_MODELS.iter())
}

pub fn lookup(model_id: &str) -> Option<&'static ModelSpec> {
    all_models().find(|spec| spec.id == model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_models() {
        let spec = lookup("gemini-2.5-flash-image-landscape").unwrap();
        assert_eq!(spec.backend_name, "GEM_PIX");
        assert!(!spec.is_video());

        let spec = lookup("veo_3_1_t2v_fast_landscape").unwrap();
        assert_eq!(spec.backend_name, "veo_3_1_t2v_fast");
        assert!(spec.is_video());

        // portrait t2v keeps the orientation suffix in the backend key
        let spec = lookup("veo_3_1_t2v_fast_portrait").unwrap();
        assert_eq!(spec.backend_name, "veo_3_1_t2v_fast_portrait");

        assert!(lookup("gpt-4o").is_none());
    }

    #[test]
    fn test_kind_derivation() {
        let image = lookup("imagen-4.0-generate-preview-portrait").unwrap();
        assert_eq!(image.kind_for(0), GenerationKind::TextToImage);
        assert_eq!(image.kind_for(2), GenerationKind::ImageToImage);

        let i2v = lookup("veo_3_1_i2v_s_fast_fl_landscape").unwrap();
        assert_eq!(i2v.kind_for(1), GenerationKind::ImageToVideo);
        assert_eq!(i2v.kind_for(2), GenerationKind::FirstLastFrame);

        let r2v = lookup("veo_3_0_r2v_fast_landscape").unwrap();
        assert_eq!(r2v.kind_for(5), GenerationKind::ReferenceToVideo);
    }

    #[test]
    fn test_ids_unique() {
        let mut seen = std::collections::HashSet::new();
        for spec in all_models() {
            assert!(seen.insert(spec.id), "duplicate model id {}", spec.id);
        }
        assert_eq!(seen.len(), 20);
    }
}
