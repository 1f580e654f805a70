//! Batch demo application
//!
//! Loads a batch configuration, fills a batch with a grid of boxes, runs one
//! cull/sort pass from a fixed camera and logs the resulting draw list,
//! upload traffic and a ray pick.

use batched_mesh::config::ConfigError;
use batched_mesh::prelude::*;
use batched_mesh::render::UploadLog;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "batch_demo/batch_demo.toml";
const GRID_SIZE: usize = 5;
const GRID_SPACING: f32 = 3.0;

#[derive(Error, Debug)]
enum DemoError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("batch error: {0}")]
    Batch(#[from] BatchError),
}

struct DemoApp {
    batch: BatchedMesh,
    camera: Camera,
    instances: Vec<InstanceId>,
}

impl DemoApp {
    fn new(config: &BatchConfig) -> Self {
        log::info!("Creating batch demo application...");
        let camera = Camera::from(CameraView::perspective(
            Vec3::new(0.0, 8.0, 20.0),
            Vec3::zeros(),
            Vec3::y(),
            45.0,
            16.0 / 9.0,
            0.1,
            100.0,
        ));

        Self {
            batch: BatchedMesh::from_config(config).with_batch_id(1),
            camera,
            instances: Vec::new(),
        }
    }

    fn initialize(&mut self) -> Result<(), DemoError> {
        log::info!("Initializing batch demo...");
        let small = self.batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None)?;
        let tall = self.batch.add_geometry(&box_geometry(1.0, 3.0, 1.0), None, None)?;

        let half = (GRID_SIZE as f32 - 1.0) * GRID_SPACING * 0.5;
        for row in 0..GRID_SIZE {
            for column in 0..GRID_SIZE {
                let geometry = if (row + column) % 2 == 0 { small } else { tall };
                let id = self.batch.add_instance(geometry)?;

                let position = Vec3::new(
                    column as f32 * GRID_SPACING - half,
                    0.0,
                    row as f32 * GRID_SPACING - half,
                );
                let matrix = Transform::from_position(position).to_matrix() * Mat4::rotation_y(0.2 * row as f32);
                self.batch.set_matrix_at(id, &matrix)?;
                self.batch.set_color_at(
                    id,
                    Color::rgb(row as f32 / GRID_SIZE as f32, 0.5, column as f32 / GRID_SIZE as f32),
                )?;
                self.instances.push(id);
            }
        }

        log::info!(
            "Batch holds {} instances of {} geometries ({} vertices, {} indices unused)",
            self.batch.instance_count(),
            self.batch.geometry_count(),
            self.batch.unused_vertex_count(),
            self.batch.unused_index_count()
        );
        Ok(())
    }

    fn run(&mut self) -> Result<(), DemoError> {
        if let Some(bounds) = self.batch.compute_bounding_box()? {
            log::info!("Batch bounds: {:?} .. {:?}", bounds.min, bounds.max);
        }

        // Hide every third instance to exercise visibility
        for id in self.instances.iter().step_by(3) {
            self.batch.set_visible_at(*id, false)?;
        }

        self.batch.prepare_draw(&self.camera)?;
        log::info!("Prepared {} draws", self.batch.draw_count());
        for command in self.batch.draw_list().commands() {
            log::debug!(
                "draw instance {:>2}: offset {:>4} bytes, {} elements",
                command.instance_id,
                command.byte_offset,
                command.element_count
            );
        }

        let mut uploads = UploadLog::new();
        self.batch.flush_uploads(&mut uploads);
        for record in &uploads.records {
            log::debug!("upload {:?}: {} bytes", record.target, record.uploaded_bytes);
        }
        log::info!("Flushed {} bytes in {} uploads", uploads.total_bytes(), uploads.records.len());

        let primary = self.camera.primary();
        let ray = Ray::new(primary.position(), primary.forward());
        let mut hits = Vec::new();
        self.batch.raycast(&ray, &TriangleIntersector, &mut hits)?;
        match hits.first() {
            Some(hit) => log::info!(
                "Ray hit instance {:?} at distance {:.3}",
                hit.instance_id,
                hit.distance
            ),
            None => log::info!("Ray hit nothing"),
        }
        Ok(())
    }
}

fn load_config() -> Result<BatchConfig, DemoError> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    match BatchConfig::load_from_file(&path) {
        Ok(config) => {
            log::info!("Loaded configuration from {}", path);
            Ok(config)
        }
        Err(ConfigError::Io(err)) => {
            log::warn!("Could not read {} ({}), using defaults", path, err);
            Ok(BatchConfig::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn main() -> Result<(), DemoError> {
    batched_mesh::foundation::logging::init();
    log::info!("Starting batch demo");

    let config = load_config()?;
    let mut app = DemoApp::new(&config);
    app.initialize()?;
    app.run()?;

    log::info!("Batch demo finished");
    Ok(())
}
