pub mod depth_pass;
pub mod scene_mesh;
